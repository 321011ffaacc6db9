//! Chaining and pipe front-ends.
//!
//! Both styles lower to the same [`Operation`] (see [`Targeted::to_perform`]
//! and [`Targeted::to_verify`]). [`Session::execute`] runs a lowered
//! operation by calling the session's perform or verify path, and the
//! chaining methods call those same two paths directly with the query and
//! policy they carry. The pipe operators are thin `BitOr` impls that call the
//! chaining methods, so the two spellings below are the same program:
//!
//! ```
//! use std::sync::Arc;
//! use sondeo::prelude::*;
//! use sondeo::pipe::{first, objects_in, perform};
//!
//! let desktop = Arc::new(InMemoryDesktop::new());
//! let app = desktop.add_application("demo");
//! let table = desktop.add_node(&app, NodeSpec::new(Role::Table)).unwrap();
//! desktop
//!     .add_node(&table, NodeSpec::new(Role::PushButton).name("Submit").action("click"))
//!     .unwrap();
//! let session = Session::attach(desktop.clone(), app);
//!
//! let chained = session
//!     .objects_in(by::role(Role::Table))
//!     .objects_in(by::name("Submit"))
//!     .first()
//!     .perform("click")
//!     .unwrap();
//! let piped = (session.root()
//!     | objects_in(by::role(Role::Table))
//!     | objects_in(by::name("Submit"))
//!     | first()
//!     | perform("click"))
//! .unwrap();
//! assert_eq!(chained, piped);
//! assert_eq!(desktop.dispatched().len(), 2);
//! ```

use std::fmt;
use std::ops::BitOr;

use crate::dispatch::ActionReport;
use crate::query::{Predicate, Query, ResultSet};
use crate::resolve::{resolve, Cardinality, Purpose, Resolved};
use crate::result::SondeoResult;
use crate::session::Session;
use crate::verify::{Expectation, VerifyConfig, VerifyReport};

// =============================================================================
// OPERATION
// =============================================================================

/// What to do with the resolved targets
#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    /// Dispatch an input action
    Perform {
        /// Action name
        action: String,
    },
    /// Poll until an expectation holds
    Verify {
        /// Condition to check
        expectation: Expectation,
        /// Schedule override (the session's when `None`)
        config: Option<VerifyConfig>,
    },
}

/// A fully specified request: query, policy and what to do
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Elements to consider
    pub query: Query,
    /// Cardinality policy, always explicit
    pub policy: Cardinality,
    /// Action or assertion
    pub kind: OperationKind,
}

impl Operation {
    /// Action request
    #[must_use]
    pub fn perform(query: Query, policy: Cardinality, action: impl Into<String>) -> Self {
        Self {
            query,
            policy,
            kind: OperationKind::Perform {
                action: action.into(),
            },
        }
    }

    /// Assertion request
    #[must_use]
    pub fn verify(
        query: Query,
        policy: Cardinality,
        expectation: Expectation,
        config: Option<VerifyConfig>,
    ) -> Self {
        Self {
            query,
            policy,
            kind: OperationKind::Verify {
                expectation,
                config,
            },
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OperationKind::Perform { action } => {
                write!(f, "perform '{action}' on {} of {}", self.policy, self.query)
            }
            OperationKind::Verify { expectation, .. } => {
                write!(f, "verify {} of {} {expectation}", self.policy, self.query)
            }
        }
    }
}

/// Result of an executed operation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Every required target accepted the action
    Performed(ActionReport),
    /// The expectation held
    Verified(VerifyReport),
}

impl Outcome {
    /// The action report, for `Perform` operations
    #[must_use]
    pub fn into_action_report(self) -> Option<ActionReport> {
        match self {
            Self::Performed(report) => Some(report),
            Self::Verified(_) => None,
        }
    }

    /// The verification report, for `Verify` operations
    #[must_use]
    pub fn into_verify_report(self) -> Option<VerifyReport> {
        match self {
            Self::Verified(report) => Some(report),
            Self::Performed(_) => None,
        }
    }
}

// =============================================================================
// SELECTION
// =============================================================================

/// A query bound to a session, with no cardinality chosen yet
#[derive(Debug, Clone)]
pub struct Selection<'s> {
    session: &'s Session,
    query: Query,
}

impl PartialEq for Selection<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.session, other.session) && self.query == other.query
    }
}

impl<'s> Selection<'s> {
    pub(crate) const fn new(session: &'s Session, query: Query) -> Self {
        Self { session, query }
    }

    /// The underlying query
    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// Narrow to elements matching `predicate` inside the current results
    #[must_use]
    pub fn objects_in(self, predicate: Predicate) -> Self {
        Self {
            session: self.session,
            query: self.query.objects_in(predicate),
        }
    }

    /// Evaluate now
    ///
    /// # Errors
    ///
    /// Propagates service failures.
    pub fn evaluate(&self) -> SondeoResult<ResultSet> {
        self.session.evaluate(&self.query)
    }

    /// Choose a cardinality policy
    #[must_use]
    pub fn with_policy(self, policy: Cardinality) -> Targeted<'s> {
        Targeted {
            session: self.session,
            query: self.query,
            policy,
            config: None,
        }
    }

    /// Target the first element
    #[must_use]
    pub fn first(self) -> Targeted<'s> {
        self.with_policy(Cardinality::First)
    }

    /// Target every element, satisfied by any
    #[must_use]
    pub fn any(self) -> Targeted<'s> {
        self.with_policy(Cardinality::Any)
    }

    /// Target every element, satisfied only by all
    #[must_use]
    pub fn all(self) -> Targeted<'s> {
        self.with_policy(Cardinality::All)
    }

    /// Target the only element
    #[must_use]
    pub fn exactly_one(self) -> Targeted<'s> {
        self.with_policy(Cardinality::ExactlyOne)
    }

    /// Perform on the only element
    ///
    /// # Errors
    ///
    /// See [`Targeted::perform`].
    pub fn perform(self, action: impl Into<String>) -> SondeoResult<ActionReport> {
        self.exactly_one().perform(action)
    }

    /// Verify the only element matches
    ///
    /// # Errors
    ///
    /// See [`Targeted::verify`].
    pub fn verify(self, predicate: Predicate) -> SondeoResult<VerifyReport> {
        self.exactly_one().verify(predicate)
    }

    /// Verify some element matches
    ///
    /// # Errors
    ///
    /// See [`Targeted::verify`].
    pub fn verify_any(self, predicate: Predicate) -> SondeoResult<VerifyReport> {
        self.any().verify(predicate)
    }

    /// Verify the first element matches
    ///
    /// # Errors
    ///
    /// See [`Targeted::verify`].
    pub fn verify_first(self, predicate: Predicate) -> SondeoResult<VerifyReport> {
        self.first().verify(predicate)
    }

    /// Verify every element matches
    ///
    /// # Errors
    ///
    /// See [`Targeted::verify`].
    pub fn verify_all(self, predicate: Predicate) -> SondeoResult<VerifyReport> {
        self.all().verify(predicate)
    }

    /// Start a `shows` assertion; the policy is chosen by the `on_*` call
    #[must_use]
    pub fn verify_that_shows(self, predicate: Predicate) -> ShowsCheck<'s> {
        ShowsCheck {
            selection: self,
            predicate,
        }
    }
}

/// `shows` assertion waiting for its policy
#[derive(Debug, Clone)]
pub struct ShowsCheck<'s> {
    selection: Selection<'s>,
    predicate: Predicate,
}

impl ShowsCheck<'_> {
    /// Every element shows the predicate
    ///
    /// # Errors
    ///
    /// See [`Targeted::to_show`].
    pub fn on_all(self) -> SondeoResult<VerifyReport> {
        self.selection.all().to_show(self.predicate)
    }

    /// Some element shows the predicate
    ///
    /// # Errors
    ///
    /// See [`Targeted::to_show`].
    pub fn on_any(self) -> SondeoResult<VerifyReport> {
        self.selection.any().to_show(self.predicate)
    }

    /// The first element shows the predicate
    ///
    /// # Errors
    ///
    /// See [`Targeted::to_show`].
    pub fn on_first(self) -> SondeoResult<VerifyReport> {
        self.selection.first().to_show(self.predicate)
    }

    /// The only element shows the predicate
    ///
    /// # Errors
    ///
    /// See [`Targeted::to_show`].
    pub fn on_one(self) -> SondeoResult<VerifyReport> {
        self.selection.exactly_one().to_show(self.predicate)
    }
}

// =============================================================================
// TARGETED
// =============================================================================

/// A selection with its cardinality policy; the only thing that can act
#[derive(Debug, Clone)]
pub struct Targeted<'s> {
    session: &'s Session,
    query: Query,
    policy: Cardinality,
    config: Option<VerifyConfig>,
}

impl PartialEq for Targeted<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.session, other.session)
            && self.query == other.query
            && self.policy == other.policy
            && self.config == other.config
    }
}

impl<'s> Targeted<'s> {
    /// The policy
    #[must_use]
    pub const fn policy(&self) -> Cardinality {
        self.policy
    }

    /// The underlying query
    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// Override the assertion time budget
    #[must_use]
    pub fn within_ms(mut self, timeout_ms: u64) -> Self {
        let base = self.config.unwrap_or(self.session.config().verify);
        self.config = Some(base.with_timeout_ms(timeout_ms));
        self
    }

    /// Override the whole assertion schedule
    #[must_use]
    pub const fn with_verify_config(mut self, config: VerifyConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Evaluate and resolve now, without acting
    ///
    /// # Errors
    ///
    /// Propagates service and resolution failures.
    pub fn resolve(&self, purpose: Purpose) -> SondeoResult<Resolved> {
        let set = self.session.evaluate(&self.query)?;
        Ok(resolve(&set, self.policy, purpose)?)
    }

    /// Lower to an action request
    #[must_use]
    pub fn to_perform(&self, action: impl Into<String>) -> Operation {
        Operation::perform(self.query.clone(), self.policy, action)
    }

    /// Lower to an assertion request
    #[must_use]
    pub fn to_verify(&self, expectation: Expectation) -> Operation {
        Operation::verify(self.query.clone(), self.policy, expectation, self.config)
    }

    /// Dispatch `action` to the targets
    ///
    /// # Errors
    ///
    /// Returns resolution errors before anything is dispatched, and the
    /// composite action error when required targets failed.
    pub fn perform(self, action: impl Into<String>) -> SondeoResult<ActionReport> {
        let action = action.into();
        self.session
            .execute_perform(&self.query, self.policy, &action)
    }

    /// Wait until the targets match `predicate`
    ///
    /// # Errors
    ///
    /// Returns resolution errors immediately and a timeout error with the last
    /// observation when the deadline passes.
    pub fn verify(self, predicate: Predicate) -> SondeoResult<VerifyReport> {
        self.check(Expectation::Matches(predicate))
    }

    /// Wait until the targets show an element matching `predicate`
    ///
    /// # Errors
    ///
    /// See [`verify`](Self::verify).
    pub fn to_show(self, predicate: Predicate) -> SondeoResult<VerifyReport> {
        self.check(Expectation::Shows(predicate))
    }

    /// Wait until `expectation` holds
    ///
    /// # Errors
    ///
    /// See [`verify`](Self::verify).
    pub fn check(self, expectation: Expectation) -> SondeoResult<VerifyReport> {
        self.session
            .execute_verify(&self.query, self.policy, &expectation, self.config)
    }
}

// =============================================================================
// PIPE FORM
// =============================================================================

/// Pipe stages: `session.root() | objects_in(p) | first() | perform("click")`
pub mod pipe {
    use super::{Predicate, Selection, Targeted};
    use crate::dispatch::ActionReport;
    use crate::resolve::Cardinality;
    use crate::result::SondeoResult;
    use crate::verify::{Expectation, VerifyReport};
    use std::ops::BitOr;

    /// Narrowing stage
    #[derive(Debug, Clone, PartialEq)]
    pub struct ObjectsIn(pub Predicate);

    /// Action stage
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Perform(pub String);

    /// Assertion stage
    #[derive(Debug, Clone, PartialEq)]
    pub struct Verify(pub Expectation);

    /// Time budget stage
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Within(pub u64);

    /// Narrow to elements matching `predicate`
    #[must_use]
    pub const fn objects_in(predicate: Predicate) -> ObjectsIn {
        ObjectsIn(predicate)
    }

    /// First-element policy
    #[must_use]
    pub const fn first() -> Cardinality {
        Cardinality::First
    }

    /// Any-element policy
    #[must_use]
    pub const fn any() -> Cardinality {
        Cardinality::Any
    }

    /// All-elements policy
    #[must_use]
    pub const fn all() -> Cardinality {
        Cardinality::All
    }

    /// Exactly-one policy
    #[must_use]
    pub const fn exactly_one() -> Cardinality {
        Cardinality::ExactlyOne
    }

    /// Dispatch an action
    #[must_use]
    pub fn perform(action: impl Into<String>) -> Perform {
        Perform(action.into())
    }

    /// Targets match `predicate`
    #[must_use]
    pub const fn verify(predicate: Predicate) -> Verify {
        Verify(Expectation::Matches(predicate))
    }

    /// Targets show an element matching `predicate`
    #[must_use]
    pub const fn shows(predicate: Predicate) -> Verify {
        Verify(Expectation::Shows(predicate))
    }

    /// Assertion time budget in milliseconds
    #[must_use]
    pub const fn within_ms(timeout_ms: u64) -> Within {
        Within(timeout_ms)
    }

    impl<'s> BitOr<ObjectsIn> for Selection<'s> {
        type Output = Selection<'s>;

        fn bitor(self, stage: ObjectsIn) -> Selection<'s> {
            self.objects_in(stage.0)
        }
    }

    impl<'s> BitOr<Cardinality> for Selection<'s> {
        type Output = Targeted<'s>;

        fn bitor(self, policy: Cardinality) -> Targeted<'s> {
            self.with_policy(policy)
        }
    }

    impl BitOr<Perform> for Selection<'_> {
        type Output = SondeoResult<ActionReport>;

        fn bitor(self, stage: Perform) -> SondeoResult<ActionReport> {
            self.perform(stage.0)
        }
    }

    impl BitOr<Verify> for Selection<'_> {
        type Output = SondeoResult<VerifyReport>;

        fn bitor(self, stage: Verify) -> SondeoResult<VerifyReport> {
            self.exactly_one().check(stage.0)
        }
    }

    impl<'s> BitOr<Within> for Targeted<'s> {
        type Output = Targeted<'s>;

        fn bitor(self, stage: Within) -> Targeted<'s> {
            self.within_ms(stage.0)
        }
    }

    impl BitOr<Perform> for Targeted<'_> {
        type Output = SondeoResult<ActionReport>;

        fn bitor(self, stage: Perform) -> SondeoResult<ActionReport> {
            self.perform(stage.0)
        }
    }

    impl BitOr<Verify> for Targeted<'_> {
        type Output = SondeoResult<VerifyReport>;

        fn bitor(self, stage: Verify) -> SondeoResult<VerifyReport> {
            self.check(stage.0)
        }
    }

    // `Session | objects_in(p)` starts a pipe without calling `root()`
    impl<'s> BitOr<ObjectsIn> for &'s crate::session::Session {
        type Output = Selection<'s>;

        fn bitor(self, stage: ObjectsIn) -> Selection<'s> {
            self.root().objects_in(stage.0)
        }
    }
}

impl<'s> BitOr<Predicate> for Selection<'s> {
    type Output = Selection<'s>;

    fn bitor(self, predicate: Predicate) -> Selection<'s> {
        self.objects_in(predicate)
    }
}
