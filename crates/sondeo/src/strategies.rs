//! Proptest strategies for accessibility trees.
//!
//! Generated trees are small (a handful of levels, a few children per node)
//! and drawn from a narrow set of roles and names so that queries produce
//! empty, single and multiple matches with similar frequency.
//!
//! ```rust,ignore
//! proptest! {
//!     #[test]
//!     fn prop_first_is_head((desktop, app) in arb_desktop()) {
//!         let set = objects_in(app, by::any()).evaluate(&desktop).unwrap();
//!         let first = resolve(&set, Cardinality::First, Purpose::Action).unwrap();
//!         prop_assert_eq!(&first.handles()[0], &set[0]);
//!     }
//! }
//! ```

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::desktop::{InMemoryDesktop, SnapshotNode};
use crate::element::{NodeId, Role, State};

/// Roles used by generated trees
pub fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::Panel),
        Just(Role::Table),
        Just(Role::TableCell),
        Just(Role::PushButton),
        Just(Role::Label),
        Just(Role::Entry),
    ]
}

/// Names used by generated trees (collisions are intended)
pub fn arb_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("Ok".to_string()),
        Just("Submit".to_string()),
        Just("Cancel".to_string()),
    ]
}

fn arb_leaf() -> impl Strategy<Value = SnapshotNode> {
    (arb_role(), arb_name(), any::<bool>()).prop_map(|(role, name, focused)| {
        let mut states = vec![State::Visible, State::Showing];
        if focused {
            states.push(State::Focused);
        }
        let actions = if role == Role::PushButton {
            vec!["click".to_string()]
        } else {
            Vec::new()
        };
        SnapshotNode {
            id: None,
            role,
            text: name.to_lowercase(),
            name,
            states,
            actions,
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    })
}

/// A random subtree (depth up to 4, up to 4 children per node)
pub fn arb_subtree() -> impl Strategy<Value = SnapshotNode> {
    arb_leaf().prop_recursive(4, 48, 4, |inner| {
        (arb_leaf(), prop::collection::vec(inner, 0..4)).prop_map(|(mut node, children)| {
            node.children = children;
            node
        })
    })
}

/// A desktop holding one application whose content is a random subtree.
///
/// Returns the desktop together with the application node id.
pub fn arb_desktop() -> impl Strategy<Value = (InMemoryDesktop, NodeId)> {
    prop::collection::vec(arb_subtree(), 0..4).prop_filter_map(
        "snapshot must load",
        |content| {
            let app = SnapshotNode {
                id: Some("app".to_string()),
                role: Role::Application,
                name: "generated".to_string(),
                text: String::new(),
                states: Vec::new(),
                actions: Vec::new(),
                attributes: BTreeMap::new(),
                children: content,
            };
            let root = SnapshotNode {
                id: None,
                role: Role::DesktopFrame,
                name: "main".to_string(),
                text: String::new(),
                states: Vec::new(),
                actions: Vec::new(),
                attributes: BTreeMap::new(),
                children: vec![app],
            };
            InMemoryDesktop::from_snapshot(&root)
                .ok()
                .map(|d| (d, NodeId::new("app")))
        },
    )
}
