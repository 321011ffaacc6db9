//! In-memory accessibility tree.
//!
//! `InMemoryDesktop` implements [`AccessibilityService`] over a mutable tree
//! held in memory. Tests use it to stand in for a live application: action
//! effects registered with [`InMemoryDesktop::on_action`] mutate the tree the
//! way the real application would react, possibly from another thread.
//! Snapshot files (YAML or JSON) load into it for the CLI.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::element::{NodeId, Role, State, StateSet};
use crate::result::{ServiceError, SondeoError, SondeoResult};
use crate::service::{AccessibilityService, NodeInfo};

/// Reaction of the simulated application to an action.
///
/// Returning `Err` makes the service reject the action with that message.
pub type ActionEffect = Arc<dyn Fn(&InMemoryDesktop) -> Result<(), String> + Send + Sync>;

/// Builder for a node added to the in-memory tree
#[derive(Debug, Clone)]
pub struct NodeSpec {
    info: NodeInfo,
}

impl NodeSpec {
    /// Node with a role, visible and enabled
    #[must_use]
    pub fn new(role: Role) -> Self {
        let mut info = NodeInfo::new(role);
        info.states = [State::Visible, State::Showing, State::Enabled]
            .into_iter()
            .collect();
        Self { info }
    }

    /// Set the accessible name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    /// Set the text content
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.info.text = text.into();
        self
    }

    /// Add a state flag
    #[must_use]
    pub fn state(mut self, state: State) -> Self {
        self.info.states.insert(state);
        self
    }

    /// Replace all state flags
    #[must_use]
    pub fn states(mut self, states: impl IntoIterator<Item = State>) -> Self {
        self.info.states = states.into_iter().collect();
        self
    }

    /// Offer an action
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.info.actions.push(action.into());
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.attributes.insert(key.into(), value.into());
        self
    }
}

/// An action the desktop received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchedAction {
    /// Target node
    pub node: NodeId,
    /// Action name
    pub action: String,
    /// Whether the desktop accepted it
    pub accepted: bool,
}

/// Node of a snapshot file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// Optional fixed id (generated when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
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
    pub states: Vec<State>,
    /// Offered actions
    #[serde(default)]
    pub actions: Vec<String>,
    /// Object attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Child nodes in order
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

#[derive(Debug)]
struct DesktopState {
    root: NodeId,
    nodes: HashMap<NodeId, NodeInfo>,
    next_id: u64,
    // explicit snapshot ids not inserted yet; allocation skips them
    reserved: HashSet<NodeId>,
}

impl DesktopState {
    fn allocate(&mut self) -> NodeId {
        loop {
            self.next_id += 1;
            let id = NodeId::new(self.next_id.to_string());
            if !self.nodes.contains_key(&id) && !self.reserved.contains(&id) {
                return id;
            }
        }
    }

    fn insert(&mut self, parent: &NodeId, id: NodeId, mut info: NodeInfo) {
        info.parent = Some(parent.clone());
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(id.clone());
        }
        self.nodes.insert(id, info);
    }

    fn remove_subtree(&mut self, id: &NodeId) {
        if let Some(info) = self.nodes.remove(id) {
            for child in &info.children {
                self.remove_subtree(child);
            }
        }
    }
}

/// Mutable in-memory accessibility tree
pub struct InMemoryDesktop {
    state: RwLock<DesktopState>,
    effects: RwLock<HashMap<(NodeId, String), ActionEffect>>,
    log: Mutex<Vec<DispatchedAction>>,
}

impl fmt::Debug for InMemoryDesktop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("InMemoryDesktop")
            .field("root", &state.root)
            .field("nodes", &state.nodes.len())
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDesktop {
    /// Empty desktop: a single `desktop frame` root named `main`
    #[must_use]
    pub fn new() -> Self {
        let root = NodeId::new("0");
        let mut info = NodeInfo::new(Role::DesktopFrame);
        info.name = "main".to_string();
        let mut nodes = HashMap::new();
        nodes.insert(root.clone(), info);
        Self {
            state: RwLock::new(DesktopState {
                root,
                nodes,
                next_id: 0,
                reserved: HashSet::new(),
            }),
            effects: RwLock::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DesktopState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DesktopState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Id of the desktop root
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.read().root.clone()
    }

    /// Add an application under the desktop root
    pub fn add_application(&self, name: impl Into<String>) -> NodeId {
        let mut state = self.write();
        let id = state.allocate();
        let root = state.root.clone();
        let spec = NodeSpec::new(Role::Application).name(name);
        state.insert(&root, id.clone(), spec.info);
        id
    }

    /// Append a node under `parent`
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NodeNotFound`] if the parent does not exist.
    pub fn add_node(&self, parent: &NodeId, spec: NodeSpec) -> Result<NodeId, ServiceError> {
        let mut state = self.write();
        if !state.nodes.contains_key(parent) {
            return Err(ServiceError::NodeNotFound(parent.clone()));
        }
        let id = state.allocate();
        state.insert(parent, id.clone(), spec.info);
        Ok(id)
    }

    /// Remove a node and its subtree. The desktop root cannot be removed.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NodeNotFound`] if the node does not exist.
    pub fn remove_node(&self, id: &NodeId) -> Result<(), ServiceError> {
        let mut state = self.write();
        if *id == state.root {
            return Err(ServiceError::Unavailable(
                "the desktop root cannot be removed".to_string(),
            ));
        }
        let parent = state
            .nodes
            .get(id)
            .ok_or_else(|| ServiceError::NodeNotFound(id.clone()))?
            .parent
            .clone();
        if let Some(p) = parent.and_then(|p| state.nodes.get_mut(&p)) {
            p.children.retain(|c| c != id);
        }
        state.remove_subtree(id);
        Ok(())
    }

    /// Apply a change to one node
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NodeNotFound`] if the node does not exist.
    pub fn update<F>(&self, id: &NodeId, change: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&mut NodeInfo),
    {
        let mut state = self.write();
        let info = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| ServiceError::NodeNotFound(id.clone()))?;
        change(info);
        Ok(())
    }

    /// Set a node's name
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NodeNotFound`] if the node does not exist.
    pub fn set_name(&self, id: &NodeId, name: impl Into<String>) -> Result<(), ServiceError> {
        let name = name.into();
        self.update(id, |info| info.name = name)
    }

    /// Set a node's text
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NodeNotFound`] if the node does not exist.
    pub fn set_text(&self, id: &NodeId, text: impl Into<String>) -> Result<(), ServiceError> {
        let text = text.into();
        self.update(id, |info| info.text = text)
    }

    /// Set or clear a state flag
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NodeNotFound`] if the node does not exist.
    pub fn set_state(&self, id: &NodeId, state: State, on: bool) -> Result<(), ServiceError> {
        self.update(id, |info| {
            if on {
                info.states.insert(state);
            } else {
                info.states.remove(state);
            }
        })
    }

    /// Register how the simulated application reacts to an action
    pub fn on_action<F>(&self, id: &NodeId, action: impl Into<String>, effect: F)
    where
        F: Fn(&InMemoryDesktop) -> Result<(), String> + Send + Sync + 'static,
    {
        self.effects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((id.clone(), action.into()), Arc::new(effect));
    }

    /// Every action received so far, in order
    #[must_use]
    pub fn dispatched(&self) -> Vec<DispatchedAction> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Applications directly under the desktop root
    #[must_use]
    pub fn applications(&self) -> Vec<(NodeId, String)> {
        let state = self.read();
        state
            .nodes
            .get(&state.root)
            .map(|root| {
                root.children
                    .iter()
                    .filter_map(|id| state.nodes.get(id).map(|n| (id.clone(), n.name.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First node in pre-order with the given role and name
    #[must_use]
    pub fn find(&self, role: Role, name: &str) -> Option<NodeId> {
        let state = self.read();
        let mut stack = vec![state.root.clone()];
        while let Some(id) = stack.pop() {
            let info = state.nodes.get(&id)?;
            if info.role == role && info.name == name {
                return Some(id);
            }
            stack.extend(info.children.iter().rev().cloned());
        }
        None
    }

    /// Build a desktop from a snapshot tree. The snapshot root becomes the
    /// desktop root.
    ///
    /// # Errors
    ///
    /// Returns an error if two snapshot nodes declare the same id.
    pub fn from_snapshot(snapshot: &SnapshotNode) -> SondeoResult<Self> {
        let desktop = Self::new();
        {
            let mut state = desktop.write();
            state.nodes.clear();
            collect_explicit_ids(snapshot, &mut state.reserved);
            let root = match &snapshot.id {
                Some(id) => NodeId::new(id.clone()),
                None if state.reserved.contains(&NodeId::new("0")) => state.allocate(),
                None => NodeId::new("0"),
            };
            state.root = root.clone();
            let loaded = load_node(&mut state, snapshot, root, None);
            state.reserved.clear();
            loaded?;
        }
        Ok(desktop)
    }

    /// Load a YAML (`.yaml`/`.yml`) or JSON snapshot file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_snapshot(path: impl AsRef<Path>) -> SondeoResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let snapshot: SnapshotNode = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml_ng::from_str(&content)?,
        };
        tracing::debug!(path = %path.display(), "loaded snapshot");
        Self::from_snapshot(&snapshot)
    }
}

fn collect_explicit_ids(node: &SnapshotNode, ids: &mut HashSet<NodeId>) {
    if let Some(id) = &node.id {
        ids.insert(NodeId::new(id.clone()));
    }
    for child in &node.children {
        collect_explicit_ids(child, ids);
    }
}

fn load_node(
    state: &mut DesktopState,
    node: &SnapshotNode,
    id: NodeId,
    parent: Option<NodeId>,
) -> SondeoResult<()> {
    if state.nodes.contains_key(&id) {
        return Err(SondeoError::snapshot(format!("duplicate node id '{id}'")));
    }
    let mut info = NodeInfo::new(node.role);
    info.name.clone_from(&node.name);
    info.text.clone_from(&node.text);
    info.states = node.states.iter().copied().collect::<StateSet>();
    info.actions.clone_from(&node.actions);
    info.attributes.clone_from(&node.attributes);
    info.parent = parent;
    state.nodes.insert(id.clone(), info);

    for child in &node.children {
        let child_id = match &child.id {
            Some(explicit) => NodeId::new(explicit.clone()),
            None => state.allocate(),
        };
        load_node(state, child, child_id.clone(), Some(id.clone()))?;
        if let Some(p) = state.nodes.get_mut(&id) {
            p.children.push(child_id);
        }
    }
    Ok(())
}

impl AccessibilityService for InMemoryDesktop {
    fn desktop(&self) -> Result<NodeId, ServiceError> {
        Ok(self.root())
    }

    fn node(&self, id: &NodeId) -> Result<NodeInfo, ServiceError> {
        self.read()
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::NodeNotFound(id.clone()))
    }

    fn do_action(&self, id: &NodeId, action: &str) -> Result<(), ServiceError> {
        let offered = {
            let state = self.read();
            let info = state
                .nodes
                .get(id)
                .ok_or_else(|| ServiceError::NodeNotFound(id.clone()))?;
            info.actions.iter().any(|a| a == action)
        };

        let effect = self
            .effects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(id.clone(), action.to_string()))
            .cloned();

        // Locks are released before the effect runs: effects mutate the tree.
        let outcome = if offered {
            effect.map_or(Ok(()), |f| f(self))
        } else {
            Err(format!("action '{action}' is not offered"))
        };

        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DispatchedAction {
                node: id.clone(),
                action: action.to_string(),
                accepted: outcome.is_ok(),
            });

        outcome.map_err(|message| ServiceError::ActionRejected {
            node: id.clone(),
            action: action.to_string(),
            message,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_desktop_has_root() {
        let desktop = InMemoryDesktop::new();
        let root = desktop.desktop().unwrap();
        let info = desktop.node(&root).unwrap();
        assert_eq!(info.role, Role::DesktopFrame);
        assert_eq!(info.name, "main");
        assert!(info.children.is_empty());
    }

    #[test]
    fn test_add_and_remove_nodes() {
        let desktop = InMemoryDesktop::new();
        let app = desktop.add_application("calc");
        let button = desktop
            .add_node(&app, NodeSpec::new(Role::PushButton).name("="))
            .unwrap();
        assert_eq!(desktop.node(&button).unwrap().parent, Some(app.clone()));
        assert_eq!(desktop.applications(), vec![(app.clone(), "calc".to_string())]);

        desktop.remove_node(&app).unwrap();
        assert!(matches!(
            desktop.node(&button),
            Err(ServiceError::NodeNotFound(_))
        ));
        assert!(desktop.applications().is_empty());
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let desktop = InMemoryDesktop::new();
        assert!(desktop.remove_node(&desktop.root()).is_err());
    }

    #[test]
    fn test_add_node_to_missing_parent() {
        let desktop = InMemoryDesktop::new();
        let err = desktop
            .add_node(&NodeId::from("404"), NodeSpec::new(Role::Label))
            .unwrap_err();
        assert_eq!(err, ServiceError::NodeNotFound(NodeId::from("404")));
    }

    #[test]
    fn test_action_effect_mutates_tree() {
        let desktop = InMemoryDesktop::new();
        let app = desktop.add_application("counter");
        let label = desktop
            .add_node(&app, NodeSpec::new(Role::Label).text("0"))
            .unwrap();
        let button = desktop
            .add_node(&app, NodeSpec::new(Role::PushButton).action("click"))
            .unwrap();
        let target = label.clone();
        desktop.on_action(&button, "click", move |d| {
            d.set_text(&target, "1").map_err(|e| e.to_string())
        });

        desktop.do_action(&button, "click").unwrap();
        assert_eq!(desktop.node(&label).unwrap().text, "1");
        assert_eq!(
            desktop.dispatched(),
            vec![DispatchedAction {
                node: button,
                action: "click".into(),
                accepted: true,
            }]
        );
    }

    #[test]
    fn test_action_not_offered_is_rejected() {
        let desktop = InMemoryDesktop::new();
        let app = desktop.add_application("a");
        let label = desktop.add_node(&app, NodeSpec::new(Role::Label)).unwrap();
        let err = desktop.do_action(&label, "click").unwrap_err();
        assert!(matches!(err, ServiceError::ActionRejected { .. }));
        assert!(!desktop.dispatched()[0].accepted);
    }

    #[test]
    fn test_effect_error_is_rejection() {
        let desktop = InMemoryDesktop::new();
        let app = desktop.add_application("a");
        let button = desktop
            .add_node(&app, NodeSpec::new(Role::PushButton).action("click"))
            .unwrap();
        desktop.on_action(&button, "click", |_| Err("widget is busy".to_string()));
        let err = desktop.do_action(&button, "click").unwrap_err();
        assert!(err.to_string().contains("widget is busy"));
    }

    #[test]
    fn test_find_by_role_and_name() {
        let desktop = InMemoryDesktop::new();
        let app = desktop.add_application("a");
        let ok = desktop
            .add_node(&app, NodeSpec::new(Role::PushButton).name("Ok"))
            .unwrap();
        assert_eq!(desktop.find(Role::PushButton, "Ok"), Some(ok));
        assert_eq!(desktop.find(Role::PushButton, "Cancel"), None);
    }

    #[test]
    fn test_snapshot_yaml_loading() {
        let yaml = r#"
role: desktop frame
name: main
children:
  - role: application
    name: Contador
    children:
      - role: label
        text: Has pulsado 0 veces
        states: [visible, showing]
      - id: btn
        role: push button
        name: Contar
        actions: [click]
"#;
        let snapshot: SnapshotNode = serde_yaml_ng::from_str(yaml).unwrap();
        let desktop = InMemoryDesktop::from_snapshot(&snapshot).unwrap();
        let apps = desktop.applications();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].1, "Contador");
        let button = desktop.node(&NodeId::from("btn")).unwrap();
        assert_eq!(button.actions, vec!["click".to_string()]);
        assert_eq!(button.parent, Some(apps[0].0.clone()));
    }

    #[test]
    fn test_snapshot_duplicate_ids_rejected() {
        let snapshot = SnapshotNode {
            id: Some("x".into()),
            role: Role::DesktopFrame,
            name: String::new(),
            text: String::new(),
            states: Vec::new(),
            actions: Vec::new(),
            attributes: BTreeMap::new(),
            children: vec![SnapshotNode {
                id: Some("x".into()),
                role: Role::Application,
                name: String::new(),
                text: String::new(),
                states: Vec::new(),
                actions: Vec::new(),
                attributes: BTreeMap::new(),
                children: Vec::new(),
            }],
        };
        let err = InMemoryDesktop::from_snapshot(&snapshot).unwrap_err();
        assert!(err.to_string().contains("duplicate node id 'x'"));
    }

    #[test]
    fn test_snapshot_mixed_ids_do_not_collide() {
        let yaml = r#"
role: desktop frame
children:
  - role: application
    name: a
  - id: "1"
    role: application
    name: b
  - id: "0"
    role: application
    name: c
"#;
        let snapshot: SnapshotNode = serde_yaml_ng::from_str(yaml).unwrap();
        let desktop = InMemoryDesktop::from_snapshot(&snapshot).unwrap();
        let apps = desktop.applications();
        let names: Vec<&str> = apps.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(apps[1].0, NodeId::from("1"));
        assert_eq!(apps[2].0, NodeId::from("0"));
        assert_ne!(apps[0].0, NodeId::from("1"));
        assert_ne!(desktop.root(), NodeId::from("0"));

        // later additions keep avoiding snapshot ids
        let d = desktop.add_application("d");
        assert!(!apps.iter().any(|(id, _)| *id == d));
    }

    #[test]
    fn test_load_snapshot_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        std::fs::write(
            &path,
            r#"{"role":"desktop frame","children":[{"role":"application","name":"x"}]}"#,
        )
        .unwrap();
        let desktop = InMemoryDesktop::load_snapshot(&path).unwrap();
        assert_eq!(desktop.applications()[0].1, "x");
    }
}
