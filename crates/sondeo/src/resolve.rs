//! Resolver: applies a cardinality policy to a result set.
//!
//! | policy        | empty set                          | one  | many       |
//! |---------------|------------------------------------|------|------------|
//! | `First`       | `Empty`                            | it   | index 0    |
//! | `ExactlyOne`  | `Empty`                            | it   | `Ambiguous`|
//! | `Any`         | `Empty` for actions, kept for asserts | all | all       |
//! | `All`         | `Empty` for actions, kept for asserts | all | all       |
//!
//! An empty `All` assertion is vacuously true and an empty `Any` assertion
//! can never hold; the assertion engine decides that, the resolver only
//! passes the empty set through.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::element::ElementHandle;
use crate::query::ResultSet;
use crate::result::{ResolutionError, SondeoError};

/// How many elements of a result set an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    /// The first element in traversal order
    First,
    /// Every element; satisfied if at least one element satisfies
    Any,
    /// Every element; satisfied only if every element satisfies
    All,
    /// The only element; more than one is an error
    ExactlyOne,
}

impl Cardinality {
    /// Policy name as accepted by [`FromStr`]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Any => "any",
            Self::All => "all",
            Self::ExactlyOne => "exactly-one",
        }
    }

    /// Whether the policy targets a single element
    #[must_use]
    pub const fn is_single(self) -> bool {
        matches!(self, Self::First | Self::ExactlyOne)
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cardinality {
    type Err = SondeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "first" => Ok(Self::First),
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            "one" | "exactly-one" => Ok(Self::ExactlyOne),
            _ => Err(SondeoError::UnknownPolicy {
                name: s.to_string(),
            }),
        }
    }
}

/// What the resolved handles will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Dispatching an input action (side effects)
    Action,
    /// Checking an expectation (read-only)
    Assertion,
}

/// Handles selected by a policy
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    policy: Cardinality,
    handles: Vec<ElementHandle>,
    origin: String,
}

impl Resolved {
    /// Policy that produced the selection
    #[must_use]
    pub const fn policy(&self) -> Cardinality {
        self.policy
    }

    /// Selected handles in traversal order
    #[must_use]
    pub fn handles(&self) -> &[ElementHandle] {
        &self.handles
    }

    /// Description of the query the set came from
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Number of selected handles
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether nothing was selected (only possible for assertions)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Apply `policy` to `set`.
///
/// # Errors
///
/// Returns [`ResolutionError::Empty`] when the policy needs an element and
/// there is none, and [`ResolutionError::Ambiguous`] when `ExactlyOne` meets
/// more than one.
pub fn resolve(
    set: &ResultSet,
    policy: Cardinality,
    purpose: Purpose,
) -> Result<Resolved, ResolutionError> {
    let empty = || ResolutionError::Empty {
        query: set.origin().to_string(),
        policy,
    };
    let handles = match policy {
        Cardinality::First => vec![set.first().cloned().ok_or_else(empty)?],
        Cardinality::ExactlyOne => match set.handles() {
            [] => return Err(empty()),
            [only] => vec![only.clone()],
            many => {
                return Err(ResolutionError::Ambiguous {
                    query: set.origin().to_string(),
                    count: many.len(),
                })
            }
        },
        Cardinality::Any | Cardinality::All => {
            if set.is_empty() && purpose == Purpose::Action {
                return Err(empty());
            }
            set.handles().to_vec()
        }
    };
    Ok(Resolved {
        policy,
        handles,
        origin: set.origin().to_string(),
    })
}
