//! Session configuration.
//!
//! ```yaml
//! verify:
//!   timeout_ms: 2000
//!   poll_interval_ms: 25
//! app_wait:
//!   timeout_ms: 10000
//! ```
//!
//! Missing keys keep their defaults. `SONDEO_TIMEOUT_MS` and
//! `SONDEO_POLL_INTERVAL_MS` override the assertion schedule.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::result::{SondeoError, SondeoResult};
use crate::verify::VerifyConfig;

/// Environment variable overriding the assertion timeout
pub const ENV_TIMEOUT_MS: &str = "SONDEO_TIMEOUT_MS";

/// Environment variable overriding the first poll interval
pub const ENV_POLL_INTERVAL_MS: &str = "SONDEO_POLL_INTERVAL_MS";

/// Timeouts and polling schedules of a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SondeoConfig {
    /// Schedule of assertions
    pub verify: VerifyConfig,
    /// Schedule of the wait for an application to appear
    pub app_wait: VerifyConfig,
}

impl Default for SondeoConfig {
    fn default() -> Self {
        Self {
            verify: VerifyConfig::default(),
            app_wait: VerifyConfig::app_wait(),
        }
    }
}

impl SondeoConfig {
    /// Parse YAML
    ///
    /// # Errors
    /// Returns error if the YAML is invalid or a value is out of range.
    pub fn from_yaml_str(yaml: &str) -> SondeoResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> SondeoResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            SondeoError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Set the assertion schedule
    #[must_use]
    pub const fn with_verify(mut self, verify: VerifyConfig) -> Self {
        self.verify = verify;
        self
    }

    /// Set the application wait schedule
    #[must_use]
    pub const fn with_app_wait(mut self, app_wait: VerifyConfig) -> Self {
        self.app_wait = app_wait;
        self
    }

    /// Apply `SONDEO_*` environment overrides
    ///
    /// # Errors
    /// Returns error if a variable is set to something other than an integer.
    pub fn with_env_overrides(self) -> SondeoResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    ///
    /// # Errors
    /// Returns error if a variable is set to something other than an integer.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> SondeoResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_ms(&lookup, ENV_TIMEOUT_MS)? {
            self.verify.timeout_ms = ms;
        }
        if let Some(ms) = parse_ms(&lookup, ENV_POLL_INTERVAL_MS)? {
            self.verify.poll_interval_ms = ms;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> SondeoResult<()> {
        for (name, schedule) in [("verify", &self.verify), ("app_wait", &self.app_wait)] {
            if !schedule.backoff.is_finite() || schedule.backoff < 1.0 {
                return Err(SondeoError::config(format!(
                    "{name}.backoff must be at least 1.0, got {}",
                    schedule.backoff
                )));
            }
            if schedule.poll_interval_ms == 0 {
                return Err(SondeoError::config(format!(
                    "{name}.poll_interval_ms must be positive"
                )));
            }
        }
        Ok(())
    }
}

fn parse_ms<F>(lookup: &F, key: &str) -> SondeoResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|_| {
                SondeoError::config(format!("{key} must be milliseconds, got '{raw}'"))
            })
        })
        .transpose()
}
