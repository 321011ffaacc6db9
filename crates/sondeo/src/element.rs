//! Element handles: immutable observations of accessibility-tree nodes.
//!
//! A handle records what a node looked like at the moment it was traversed:
//! role, name, text, states, offered actions, attributes and its children.
//! Handles never change after capture. When the application mutates, a
//! handle goes stale; that is detected by re-validating against the service,
//! never by sharing mutable state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::result::{ServiceError, SondeoError};
use crate::service::AccessibilityService;

// =============================================================================
// NODE ID
// =============================================================================

/// Opaque identity of a node as assigned by the accessibility service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// ROLE
// =============================================================================

macro_rules! roles {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Kind of accessible element, named after the AT-SPI role names
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Role {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )+
        }

        impl Role {
            /// Every known role
            pub const ALL: &'static [Role] = &[$(Role::$variant),+];

            /// The AT-SPI role name (e.g. `push button`)
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }
    };
}

roles! {
    Alert => "alert",
    Application => "application",
    Canvas => "canvas",
    CheckBox => "check box",
    CheckMenuItem => "check menu item",
    ColumnHeader => "column header",
    ComboBox => "combo box",
    DesktopFrame => "desktop frame",
    Dialog => "dialog",
    DocumentFrame => "document frame",
    Entry => "entry",
    Filler => "filler",
    Frame => "frame",
    Heading => "heading",
    Image => "image",
    Label => "label",
    Link => "link",
    List => "list",
    ListBox => "list box",
    ListItem => "list item",
    Menu => "menu",
    MenuBar => "menu bar",
    MenuItem => "menu item",
    PageTab => "page tab",
    PageTabList => "page tab list",
    Panel => "panel",
    Paragraph => "paragraph",
    PasswordText => "password text",
    ProgressBar => "progress bar",
    PushButton => "push button",
    RadioButton => "radio button",
    RowHeader => "row header",
    ScrollBar => "scroll bar",
    ScrollPane => "scroll pane",
    Separator => "separator",
    Slider => "slider",
    SpinButton => "spin button",
    StatusBar => "status bar",
    Table => "table",
    TableCell => "table cell",
    TableRow => "table row",
    Text => "text",
    ToggleButton => "toggle button",
    ToolBar => "tool bar",
    ToolTip => "tool tip",
    Tree => "tree",
    TreeItem => "tree item",
    TreeTable => "tree table",
    Unknown => "unknown",
    Window => "window",
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect::<String>()
        .to_lowercase()
}

impl Role {
    /// Look up a role by name.
    ///
    /// Accepts the AT-SPI spelling (`push button`) as well as enum-style
    /// spellings (`PUSH_BUTTON`, `push-button`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = normalize_name(name);
        Self::ALL.iter().copied().find(|r| r.as_str() == wanted)
    }

    /// Role names that look like `name`, for error hints
    #[must_use]
    pub fn suggestions(name: &str) -> Vec<&'static str> {
        let wanted = normalize_name(name);
        if wanted.is_empty() {
            return Vec::new();
        }
        let words: Vec<&str> = wanted.split_whitespace().collect();
        Self::ALL
            .iter()
            .map(|r| r.as_str())
            .filter(|candidate| {
                candidate.contains(wanted.as_str())
                    || words.iter().any(|w| w.len() > 2 && candidate.contains(w))
            })
            .collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SondeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            let suggestions = Self::suggestions(s);
            let hint = if suggestions.is_empty() {
                String::new()
            } else {
                format!(" (did you mean: {}?)", suggestions.join(", "))
            };
            SondeoError::UnknownRole {
                name: s.to_string(),
                hint,
            }
        })
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Observable state flag of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Currently the active window or widget
    Active,
    /// Checked (check boxes, toggles)
    Checked,
    /// Contents may be edited
    Editable,
    /// Accepts user interaction
    Enabled,
    /// Expanded (tree items, combo boxes)
    Expanded,
    /// Can receive focus
    Focusable,
    /// Has keyboard focus
    Focused,
    /// Selected
    Selected,
    /// Responds to input
    Sensitive,
    /// Actually drawn on screen
    Showing,
    /// Would be drawn if its ancestors were
    Visible,
}

impl State {
    /// Every known state
    pub const ALL: &'static [State] = &[
        Self::Active,
        Self::Checked,
        Self::Editable,
        Self::Enabled,
        Self::Expanded,
        Self::Focusable,
        Self::Focused,
        Self::Selected,
        Self::Sensitive,
        Self::Showing,
        Self::Visible,
    ];

    /// Lowercase state name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Checked => "checked",
            Self::Editable => "editable",
            Self::Enabled => "enabled",
            Self::Expanded => "expanded",
            Self::Focusable => "focusable",
            Self::Focused => "focused",
            Self::Selected => "selected",
            Self::Sensitive => "sensitive",
            Self::Showing => "showing",
            Self::Visible => "visible",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = SondeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == wanted)
            .ok_or_else(|| SondeoError::UnknownState {
                name: s.to_string(),
            })
    }
}

/// Set of state flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSet(BTreeSet<State>);

impl StateSet {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the flag is set
    #[must_use]
    pub fn contains(&self, state: State) -> bool {
        self.0.contains(&state)
    }

    /// Set a flag
    pub fn insert(&mut self, state: State) -> bool {
        self.0.insert(state)
    }

    /// Clear a flag
    pub fn remove(&mut self, state: State) -> bool {
        self.0.remove(&state)
    }

    /// Flags in a stable order
    pub fn iter(&self) -> impl Iterator<Item = State> + '_ {
        self.0.iter().copied()
    }

    /// Number of flags set
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no flag is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<State> for StateSet {
    fn from_iter<I: IntoIterator<Item = State>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// TREE PATH
// =============================================================================

/// Position of a node among its siblings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NthOf {
    /// 0-based index among siblings
    pub index: usize,
    /// Number of siblings (including the node)
    pub siblings: usize,
}

impl NthOf {
    /// Create a position
    #[must_use]
    pub const fn new(index: usize, siblings: usize) -> Self {
        Self { index, siblings }
    }

    /// Whether the node is the last of its siblings
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.index + 1 == self.siblings
    }
}

impl fmt::Display for NthOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.siblings)
    }
}

/// Positions from the traversal root down to a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreePath(Vec<NthOf>);

impl TreePath {
    /// Path made of the given steps (an empty list means a traversal root)
    #[must_use]
    pub fn new(steps: Vec<NthOf>) -> Self {
        if steps.is_empty() {
            Self::root()
        } else {
            Self(steps)
        }
    }

    /// Path of a traversal root
    #[must_use]
    pub fn root() -> Self {
        Self(vec![NthOf::new(0, 1)])
    }

    /// Path of the `index`-th of `siblings` children under this path
    #[must_use]
    pub fn child(&self, index: usize, siblings: usize) -> Self {
        let mut steps = self.0.clone();
        steps.push(NthOf::new(index, siblings));
        Self(steps)
    }

    /// Position of the node itself
    #[must_use]
    pub fn last(&self) -> NthOf {
        self.0.last().copied().unwrap_or(NthOf::new(0, 1))
    }

    /// Every step from the root
    #[must_use]
    pub fn steps(&self) -> &[NthOf] {
        &self.0
    }

    /// Number of steps
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl Default for TreePath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&steps.join(" > "))
    }
}

// =============================================================================
// ELEMENT HANDLE
// =============================================================================

#[derive(Debug, PartialEq)]
struct ElementNode {
    id: NodeId,
    role: Role,
    name: String,
    text: String,
    states: StateSet,
    actions: Vec<String>,
    attributes: BTreeMap<String, String>,
    path: TreePath,
    parent: Option<NodeId>,
    children: Vec<ElementHandle>,
}

/// Immutable reference to one node as observed during a traversal
#[derive(Debug, Clone)]
pub struct ElementHandle(Arc<ElementNode>);

impl PartialEq for ElementHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl ElementHandle {
    /// Traverse the subtree rooted at `id` and capture it as a handle.
    ///
    /// Children that disappear while the traversal is running are skipped:
    /// the application is free to mutate its tree at any time.
    ///
    /// # Errors
    ///
    /// Returns an error if the root node itself cannot be read.
    pub fn capture(service: &dyn AccessibilityService, id: &NodeId) -> Result<Self, ServiceError> {
        Self::capture_at(service, id, TreePath::root())
    }

    /// Like [`capture`](Self::capture) with a known position for the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the root node itself cannot be read.
    pub fn capture_at(
        service: &dyn AccessibilityService,
        id: &NodeId,
        path: TreePath,
    ) -> Result<Self, ServiceError> {
        let info = service.node(id)?;
        let siblings = info.children.len();
        let mut children = Vec::with_capacity(siblings);
        for (index, child_id) in info.children.iter().enumerate() {
            match Self::capture_at(service, child_id, path.child(index, siblings)) {
                Ok(child) => children.push(child),
                Err(ServiceError::NodeNotFound(gone)) => {
                    tracing::debug!(node = %gone, "child vanished during traversal");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Self(Arc::new(ElementNode {
            id: id.clone(),
            role: info.role,
            name: info.name,
            text: info.text,
            states: info.states,
            actions: info.actions,
            attributes: info.attributes,
            path,
            parent: info.parent,
            children,
        })))
    }

    /// Node identity
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.0.id
    }

    /// Element role
    #[must_use]
    pub fn role(&self) -> Role {
        self.0.role
    }

    /// Accessible name (may be empty)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Text content (may be empty)
    #[must_use]
    pub fn text(&self) -> &str {
        &self.0.text
    }

    /// State flags at observation time
    #[must_use]
    pub fn states(&self) -> &StateSet {
        &self.0.states
    }

    /// Whether a state flag was set
    #[must_use]
    pub fn has_state(&self, state: State) -> bool {
        self.0.states.contains(state)
    }

    /// Names of the actions the node offered
    #[must_use]
    pub fn actions(&self) -> &[String] {
        &self.0.actions
    }

    /// Whether the node offered the action
    #[must_use]
    pub fn has_action(&self, action: &str) -> bool {
        self.0.actions.iter().any(|a| a == action)
    }

    /// Object attributes
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.0.attributes
    }

    /// Look up an observable value by name.
    ///
    /// `role`, `name` and `text` map to the dedicated fields; anything else
    /// is looked up in the attribute map.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        match key {
            "role" => Some(self.0.role.as_str()),
            "name" => Some(&self.0.name),
            "text" => Some(&self.0.text),
            other => self.0.attributes.get(other).map(String::as_str),
        }
    }

    /// Position relative to the traversal root
    #[must_use]
    pub fn path(&self) -> &TreePath {
        &self.0.path
    }

    /// Parent node id, for lookup only
    #[must_use]
    pub fn parent_id(&self) -> Option<&NodeId> {
        self.0.parent.as_ref()
    }

    /// Child handles in order
    #[must_use]
    pub fn children(&self) -> &[ElementHandle] {
        &self.0.children
    }

    /// This element and all its descendants, depth-first pre-order
    #[must_use]
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// Visit this element and its descendants in pre-order, together with
    /// the ancestors between the traversal root and the visited element
    /// (outermost first).
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&ElementHandle, &[&ElementHandle]),
    {
        let mut ancestors = Vec::new();
        self.walk_inner(&mut ancestors, &mut visit);
    }

    fn walk_inner<'a, F>(&'a self, ancestors: &mut Vec<&'a ElementHandle>, visit: &mut F)
    where
        F: FnMut(&ElementHandle, &[&ElementHandle]),
    {
        visit(self, ancestors);
        ancestors.push(self);
        for child in self.children() {
            child.walk_inner(ancestors, visit);
        }
        ancestors.pop();
    }

    /// Printable summary for diagnostics
    #[must_use]
    pub fn summary(&self) -> ElementSummary {
        ElementSummary {
            id: self.0.id.clone(),
            role: self.0.role,
            name: self.0.name.clone(),
            text: self.0.text.clone(),
            states: self.0.states.iter().collect(),
        }
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0.role, self.0.name)
    }
}

/// Pre-order iterator over a handle's subtree
#[derive(Debug)]
pub struct Descendants<'a> {
    stack: Vec<&'a ElementHandle>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a ElementHandle;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children().iter().rev());
        Some(next)
    }
}

/// Detached, serializable description of an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSummary {
    /// Node identity
    pub id: NodeId,
    /// Element role
    pub role: Role,
    /// Accessible name
    pub name: String,
    /// Text content
    pub text: String,
    /// State flags
    pub states: Vec<State>,
}

impl fmt::Display for ElementSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.role, self.name)?;
        if !self.text.is_empty() && self.text != self.name {
            write!(f, " text={:?}", self.text)?;
        }
        Ok(())
    }
}
