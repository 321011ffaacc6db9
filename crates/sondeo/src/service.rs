//! Seam to the accessibility service client.
//!
//! The client is an external collaborator: it reads nodes from a live tree
//! and submits input events. Sondeo only needs two primitives from it, node
//! lookup and action dispatch, plus the id of the desktop root.
//!
//! ```text
//! ┌──────────────────────────┐       ┌───────────────────────────┐
//! │ Query / Dispatcher /     │──────►│ AccessibilityService       │
//! │ Assertion Engine         │       │  desktop() node() action() │
//! └──────────────────────────┘       └────────────┬──────────────┘
//!                                                 │
//!                         ┌───────────────────────┴─────────────┐
//!                         │ AT-SPI client    │ InMemoryDesktop   │
//!                         │ (external)       │ (tests, snapshots)│
//!                         └──────────────────┴──────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::element::{NodeId, Role, StateSet};
use crate::result::ServiceError;

/// Everything the service reports about one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Element role
    pub role: Role,
    /// Accessible name
    #[serde(default)]
    pub name: String,
    /// Text content
    #[serde(default)]
    pub text: String,
    /// State flags
    #[serde(default)]
    pub states: StateSet,
    /// Names of the actions the node offers
    #[serde(default)]
    pub actions: Vec<String>,
    /// Object attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Child ids in order
    #[serde(default)]
    pub children: Vec<NodeId>,
    /// Parent id
    #[serde(default)]
    pub parent: Option<NodeId>,
}

impl NodeInfo {
    /// A node with the given role and nothing else
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            role,
            name: String::new(),
            text: String::new(),
            states: StateSet::new(),
            actions: Vec::new(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            parent: None,
        }
    }
}

/// Client of a live accessibility tree.
///
/// Implementations read the tree as it is *now*; nothing here is cached by
/// the caller between operations.
pub trait AccessibilityService: Send + Sync {
    /// Id of the desktop root (whose children are applications)
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be reached.
    fn desktop(&self) -> Result<NodeId, ServiceError>;

    /// Read one node
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NodeNotFound`] if the node no longer exists.
    fn node(&self, id: &NodeId) -> Result<NodeInfo, ServiceError>;

    /// Submit a named input action to a node
    ///
    /// # Errors
    ///
    /// Returns an error if the node is gone or the service refuses the action.
    fn do_action(&self, id: &NodeId, action: &str) -> Result<(), ServiceError>;
}

impl<T: AccessibilityService + ?Sized> AccessibilityService for Arc<T> {
    fn desktop(&self) -> Result<NodeId, ServiceError> {
        (**self).desktop()
    }

    fn node(&self, id: &NodeId) -> Result<NodeInfo, ServiceError> {
        (**self).node(id)
    }

    fn do_action(&self, id: &NodeId, action: &str) -> Result<(), ServiceError> {
        (**self).do_action(id, action)
    }
}

impl<T: AccessibilityService + ?Sized> AccessibilityService for &T {
    fn desktop(&self) -> Result<NodeId, ServiceError> {
        (**self).desktop()
    }

    fn node(&self, id: &NodeId) -> Result<NodeInfo, ServiceError> {
        (**self).node(id)
    }

    fn do_action(&self, id: &NodeId, action: &str) -> Result<(), ServiceError> {
        (**self).do_action(id, action)
    }
}
