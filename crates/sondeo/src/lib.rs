//! Sondeo: end-to-end testing of GUI applications through their
//! accessibility tree.
//!
//! Sondeo (Spanish: "probe, sounding") locates widgets with composable
//! predicates, narrows the match set with a cardinality policy, sends input
//! actions to the chosen widgets and waits for the interface to reach an
//! expected state.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        SONDEO Architecture                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐   │
//! │  │  Query   │──►│ Resolver │──►│ Dispatch │──►│ Accessibility│   │
//! │  │ (scope + │   │ (first,  │   │ (perform)│   │   Service    │   │
//! │  │  pred)   │   │ any, ..) │   │          │   │ (AT-SPI, mem)│   │
//! │  └──────────┘   └────┬─────┘   └──────────┘   └──────┬───────┘   │
//! │                      │         ┌──────────┐          │           │
//! │                      └────────►│  Verify  │◄─────────┘           │
//! │                                │ (polling)│                      │
//! │                                └──────────┘                      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sondeo::prelude::*;
//!
//! let desktop = Arc::new(InMemoryDesktop::new());
//! let app = desktop.add_application("demo");
//! desktop
//!     .add_node(&app, NodeSpec::new(Role::Label).name("status").text("ready"))
//!     .unwrap();
//!
//! let session = Session::attach(desktop, app);
//! session
//!     .objects_in(by::role(Role::Label))
//!     .verify(by::text("ready"))
//!     .unwrap();
//! ```

#![warn(missing_docs)]

mod config;
mod desktop;
mod dispatch;
mod element;
mod pipeline;
mod query;
mod render;
mod resolve;
mod result;
mod service;
mod session;
mod verify;

/// Property-based testing strategies for element trees
#[cfg(any(test, feature = "proptest"))]
pub mod strategies;

pub use config::{SondeoConfig, ENV_POLL_INTERVAL_MS, ENV_TIMEOUT_MS};
pub use desktop::{ActionEffect, DispatchedAction, InMemoryDesktop, NodeSpec, SnapshotNode};
pub use dispatch::{perform, ActionReport, HandleOutcome};
pub use element::{
    Descendants, ElementHandle, ElementSummary, NodeId, NthOf, Role, State, StateSet, TreePath,
};
pub use pipeline::{
    pipe, Operation, OperationKind, Outcome, Selection, ShowsCheck, Targeted,
};
pub use query::{
    by, objects_in, CustomPredicate, Predicate, Query, ResultSet, Scope, TextMatch,
};
pub use render::{render_tree, RenderOptions};
pub use resolve::{resolve, Cardinality, Purpose, Resolved};
pub use result::{
    ActionError, ActionFailure, AssertionTimeout, IndexedFailure, ObservedElement,
    ResolutionError, ServiceError, SondeoError, SondeoResult,
};
pub use service::{AccessibilityService, NodeInfo};
pub use session::{Interaction, PerformOn, Session};
pub use verify::{
    verify, Assertion, AssertionState, Expectation, Poller, VerifyConfig, VerifyReport,
    DEFAULT_BACKOFF, DEFAULT_MAX_POLL_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS,
    MIN_POLL_INTERVAL_MS,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        by, AccessibilityService, ActionReport, Cardinality, ElementHandle, Expectation,
        InMemoryDesktop, NodeId, NodeSpec, Predicate, Query, Role, Session, SondeoConfig,
        SondeoError, SondeoResult, State, VerifyConfig, VerifyReport,
    };
}
