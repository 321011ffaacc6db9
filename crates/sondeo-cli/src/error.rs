//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// The requested application is not in the snapshot
    #[error("App {name} not found in desktop (run `sondeador apps` to list them)")]
    AppNotFound {
        /// Application name
        name: String,
    },

    /// Script steps failed
    #[error("{failed} of {total} step(s) failed")]
    CheckFailed {
        /// Failed steps
        failed: usize,
        /// Steps run
        total: usize,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sondeo library error
    #[error(transparent)]
    Sondeo(#[from] sondeo::SondeoError),

    /// JSON output error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Script parse error
    #[error("Script error: {0}")]
    Script(#[from] serde_yaml_ng::Error),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an app-not-found error
    #[must_use]
    pub fn app_not_found(name: impl Into<String>) -> Self {
        Self::AppNotFound { name: name.into() }
    }
}
