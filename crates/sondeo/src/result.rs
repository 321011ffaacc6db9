//! Result and error types for Sondeo.
//!
//! Every failure carries enough state to diagnose it without re-running the
//! test: which elements were involved, what was expected and what was last
//! observed.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::{ElementSummary, NodeId};
use crate::resolve::Cardinality;

/// Result type for Sondeo operations
pub type SondeoResult<T> = Result<T, SondeoError>;

/// Errors that can occur in Sondeo
#[derive(Debug, Error)]
pub enum SondeoError {
    /// The result set did not have the shape the operation requires
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// One or more targets of an action failed
    #[error(transparent)]
    Action(#[from] ActionError),

    /// An assertion did not hold before its deadline
    #[error(transparent)]
    AssertionTimeout(#[from] AssertionTimeout),

    /// The accessibility service failed
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The application never appeared on the desktop
    #[error("application '{name}' did not appear on the desktop within {timeout_ms}ms")]
    ApplicationNotFound {
        /// Application name searched for
        name: String,
        /// Time budget in milliseconds
        timeout_ms: u64,
    },

    /// A name/text pattern failed to compile
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The pattern source
        pattern: String,
        /// Compiler message
        message: String,
    },

    /// A role name is not known
    #[error("'{name}' is not a role name{hint}")]
    UnknownRole {
        /// The rejected name
        name: String,
        /// Suggestion suffix (may be empty)
        hint: String,
    },

    /// A state name is not known
    #[error("'{name}' is not a state name")]
    UnknownState {
        /// The rejected name
        name: String,
    },

    /// A cardinality policy name is not known
    #[error("'{name}' is not a cardinality policy (expected first, any, all or exactly-one)")]
    UnknownPolicy {
        /// The rejected name
        name: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Snapshot file could not be loaded
    #[error("Snapshot error: {message}")]
    Snapshot {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl SondeoError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a snapshot error
    #[must_use]
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot {
            message: message.into(),
        }
    }

    /// The resolution error, if this is one
    #[must_use]
    pub const fn as_resolution(&self) -> Option<&ResolutionError> {
        match self {
            Self::Resolution(e) => Some(e),
            _ => None,
        }
    }

    /// The composite action error, if this is one
    #[must_use]
    pub const fn as_action(&self) -> Option<&ActionError> {
        match self {
            Self::Action(e) => Some(e),
            _ => None,
        }
    }

    /// The assertion timeout, if this is one
    #[must_use]
    pub const fn as_timeout(&self) -> Option<&AssertionTimeout> {
        match self {
            Self::AssertionTimeout(e) => Some(e),
            _ => None,
        }
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// A result set had the wrong cardinality for the requested policy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// Nothing matched
    #[error("no element matches {query} (policy: {policy})")]
    Empty {
        /// Description of the query that produced the set
        query: String,
        /// Policy that was applied
        policy: Cardinality,
    },

    /// More than one element matched an exactly-one selection
    #[error("{count} elements match {query}, expected exactly one")]
    Ambiguous {
        /// Description of the query that produced the set
        query: String,
        /// Number of matches
        count: usize,
    },
}

impl ResolutionError {
    /// Whether this is the `Empty` case
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty { .. })
    }

    /// Whether this is the `Ambiguous` case
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

// =============================================================================
// ACTION DISPATCHER
// =============================================================================

/// Why an action could not be applied to one target
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ActionFailure {
    /// The node vanished or changed identity since it was observed
    #[error("{target} is stale: {reason}")]
    StaleTarget {
        /// The element as it was observed
        target: ElementSummary,
        /// What re-validation found
        reason: String,
    },

    /// The node does not offer the action or the service refused it
    #[error("{target} rejected action '{action}': {reason}")]
    Rejected {
        /// The element as it was observed
        target: ElementSummary,
        /// Action name
        action: String,
        /// Rejection detail
        reason: String,
    },
}

impl ActionFailure {
    /// The element the failure refers to
    #[must_use]
    pub const fn target(&self) -> &ElementSummary {
        match self {
            Self::StaleTarget { target, .. } | Self::Rejected { target, .. } => target,
        }
    }
}

/// A failed target together with its position in the resolved set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFailure {
    /// Position in traversal order (0-based)
    pub index: usize,
    /// What went wrong
    pub failure: ActionFailure,
}

/// Composite failure of an action dispatch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "action '{action}' failed on {} of {attempted} target(s) (policy: {policy}){}",
    failures.len(),
    render_failures(failures)
)]
pub struct ActionError {
    /// Action name
    pub action: String,
    /// Policy the targets were resolved with
    pub policy: Cardinality,
    /// Number of targets attempted
    pub attempted: usize,
    /// Every per-target failure, in traversal order
    pub failures: Vec<IndexedFailure>,
}

fn render_failures(failures: &[IndexedFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("\n  [{}] {}", f.index, f.failure))
        .collect()
}

// =============================================================================
// ASSERTION ENGINE
// =============================================================================

/// One element of the last poll and whether it satisfied the expectation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedElement {
    /// The element as observed
    pub element: ElementSummary,
    /// Whether it satisfied the expectation
    pub satisfied: bool,
}

impl fmt::Display for ObservedElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.satisfied { "ok" } else { "no" };
        write!(f, "[{mark}] {}", self.element)
    }
}

/// An assertion that never held before its deadline
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "{description} not satisfied after {attempts} poll(s) ({:.2}s, policy: {policy}); last observed {} element(s){}",
    elapsed.as_secs_f64(),
    last_observed.len(),
    render_observed(last_observed)
)]
pub struct AssertionTimeout {
    /// What was being verified
    pub description: String,
    /// Policy applied on every poll
    pub policy: Cardinality,
    /// Number of polls performed
    pub attempts: usize,
    /// Time spent polling
    pub elapsed: Duration,
    /// The re-evaluated set as seen by the last poll
    pub last_observed: Vec<ObservedElement>,
}

fn render_observed(observed: &[ObservedElement]) -> String {
    observed.iter().map(|o| format!("\n  {o}")).collect()
}

// =============================================================================
// ACCESSIBILITY SERVICE
// =============================================================================

/// Errors reported by an accessibility service client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The node is gone from the tree
    #[error("node {0} no longer exists")]
    NodeNotFound(NodeId),

    /// The service refused to run the action
    #[error("node {node} rejected action '{action}': {message}")]
    ActionRejected {
        /// Target node
        node: NodeId,
        /// Action name
        action: String,
        /// Service message
        message: String,
    },

    /// The service cannot be reached
    #[error("accessibility service unavailable: {0}")]
    Unavailable(String),
}
