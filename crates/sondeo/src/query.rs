//! Query engine: narrows a live accessibility tree to an ordered result set.
//!
//! A [`Query`] is a pure description (a scope plus a [`Predicate`]). Nothing
//! is read from the tree until [`Query::evaluate`] runs, and every evaluation
//! performs a fresh traversal, so re-evaluating the same query after the
//! application changed yields the new state of the tree.
//!
//! # Ordering
//!
//! Results are in depth-first pre-order. The scope node itself is part of the
//! traversal, so a query whose predicate matches the scope returns it first.
//!
//! # Example
//!
//! ```
//! use sondeo::{by, objects_in, InMemoryDesktop, NodeSpec, Role};
//!
//! let desktop = InMemoryDesktop::new();
//! let app = desktop.add_application("demo");
//! desktop.add_node(&app, NodeSpec::new(Role::PushButton).name("Ok")).unwrap();
//!
//! let buttons = objects_in(app, by::role(Role::PushButton));
//! let found = buttons.evaluate(&desktop).unwrap();
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].name(), "Ok");
//! ```

use std::fmt;
use std::ops::{BitAnd, BitOr, Index, Not};
use std::sync::Arc;

use regex::Regex;

use crate::element::{ElementHandle, NodeId, NthOf, Role, State, TreePath};
use crate::result::{ServiceError, SondeoError, SondeoResult};
use crate::service::AccessibilityService;

// =============================================================================
// TEXT MATCH
// =============================================================================

/// How a name, text or attribute value is compared
#[derive(Debug, Clone)]
pub enum TextMatch {
    /// Whole value equals the string
    Exact(String),
    /// Value contains the string
    Contains(String),
    /// Whole value matches the regular expression
    Pattern {
        /// Pattern as written
        source: String,
        /// Anchored compiled form
        regex: Regex,
    },
}

impl TextMatch {
    /// Exact comparison
    #[must_use]
    pub fn exact(value: impl Into<String>) -> Self {
        Self::Exact(value.into())
    }

    /// Substring comparison
    #[must_use]
    pub fn contains(value: impl Into<String>) -> Self {
        Self::Contains(value.into())
    }

    /// Regular expression that must match the whole value
    ///
    /// # Errors
    ///
    /// Returns [`SondeoError::InvalidPattern`] if the pattern does not compile.
    pub fn pattern(source: impl Into<String>) -> SondeoResult<Self> {
        let source = source.into();
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| {
            SondeoError::InvalidPattern {
                pattern: source.clone(),
                message: e.to_string(),
            }
        })?;
        Ok(Self::Pattern { source, regex })
    }

    /// Whether `value` satisfies the comparison
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => value == expected,
            Self::Contains(needle) => value.contains(needle.as_str()),
            Self::Pattern { regex, .. } => regex.is_match(value),
        }
    }
}

impl PartialEq for TextMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) | (Self::Contains(a), Self::Contains(b)) => a == b,
            (Self::Pattern { source: a, .. }, Self::Pattern { source: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => write!(f, "={s:?}"),
            Self::Contains(s) => write!(f, "~{s:?}"),
            Self::Pattern { source, .. } => write!(f, "=/{source}/"),
        }
    }
}

impl From<&str> for TextMatch {
    fn from(value: &str) -> Self {
        Self::exact(value)
    }
}

impl From<String> for TextMatch {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

// =============================================================================
// PREDICATE
// =============================================================================

type CustomFn = dyn Fn(&ElementHandle, &TreePath) -> bool + Send + Sync;

/// User-supplied predicate with a description for diagnostics
#[derive(Clone)]
pub struct CustomPredicate {
    description: String,
    test: Arc<CustomFn>,
}

impl CustomPredicate {
    /// Wrap a closure
    pub fn new<F>(description: impl Into<String>, test: F) -> Self
    where
        F: Fn(&ElementHandle, &TreePath) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            test: Arc::new(test),
        }
    }

    /// Description given at construction
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredicate")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CustomPredicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.test, &other.test)
    }
}

/// Composable condition on one element
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every element
    Any,
    /// The element is the traversal scope itself
    ScopeRoot,
    /// Element has the role
    Role(Role),
    /// Accessible name comparison
    Name(TextMatch),
    /// Text content comparison
    Text(TextMatch),
    /// Attribute comparison (missing attributes never match)
    Attribute {
        /// Attribute key
        key: String,
        /// Value comparison
        value: TextMatch,
    },
    /// State flag is set
    State(State),
    /// Position among siblings; negative counts from the last
    Nth(i64),
    /// The direct parent (inside the traversal scope) matches
    ChildOf(Box<Predicate>),
    /// Some ancestor (inside the traversal scope) matches
    DescendantOf(Box<Predicate>),
    /// All sub-predicates match
    And(Vec<Predicate>),
    /// At least one sub-predicate matches
    Or(Vec<Predicate>),
    /// The sub-predicate does not match
    Not(Box<Predicate>),
    /// User-supplied test
    Custom(CustomPredicate),
}

impl Predicate {
    /// Evaluate against an element whose ancestors inside the traversal
    /// scope are `ancestors` (outermost first).
    #[must_use]
    pub fn matches(&self, element: &ElementHandle, ancestors: &[&ElementHandle]) -> bool {
        match self {
            Self::Any => true,
            Self::ScopeRoot => ancestors.is_empty(),
            Self::Role(role) => element.role() == *role,
            Self::Name(m) => m.matches(element.name()),
            Self::Text(m) => m.matches(element.text()),
            Self::Attribute { key, value } => {
                element.attribute(key).is_some_and(|v| value.matches(v))
            }
            Self::State(state) => element.has_state(*state),
            Self::Nth(n) => nth_matches(*n, element.path()),
            Self::ChildOf(parent) => ancestors
                .split_last()
                .is_some_and(|(p, rest)| parent.matches(p, rest)),
            Self::DescendantOf(ancestor) => {
                (0..ancestors.len()).any(|i| ancestor.matches(ancestors[i], &ancestors[..i]))
            }
            Self::And(all) => all.iter().all(|p| p.matches(element, ancestors)),
            Self::Or(any) => any.iter().any(|p| p.matches(element, ancestors)),
            Self::Not(inner) => !inner.matches(element, ancestors),
            Self::Custom(custom) => (custom.test)(element, element.path()),
        }
    }

    /// Conjunction, flattening nested `And`s
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Self::Any, p) | (p, Self::Any) => p,
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), p) => {
                a.push(p);
                Self::And(a)
            }
            (p, Self::And(mut b)) => {
                b.insert(0, p);
                Self::And(b)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    /// Disjunction, flattening nested `Or`s
    #[must_use]
    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Self::Or(mut a), Self::Or(b)) => {
                a.extend(b);
                Self::Or(a)
            }
            (Self::Or(mut a), p) => {
                a.push(p);
                Self::Or(a)
            }
            (a, b) => Self::Or(vec![a, b]),
        }
    }

    /// Negation
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            p => Self::Not(Box::new(p)),
        }
    }
}

fn nth_matches(n: i64, path: &TreePath) -> bool {
    let pos = path.last();
    let index = i64::try_from(pos.index).unwrap_or(i64::MAX);
    let siblings = i64::try_from(pos.siblings).unwrap_or(i64::MAX);
    if n >= 0 {
        index == n
    } else {
        index == siblings + n
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Predicate], sep: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, p) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{p}")?;
            }
            f.write_str(")")
        }

        match self {
            Self::Any => f.write_str("*"),
            Self::ScopeRoot => f.write_str("scope"),
            Self::Role(role) => write!(f, "role={role:?}", role = role.as_str()),
            Self::Name(m) => write!(f, "name{m}"),
            Self::Text(m) => write!(f, "text{m}"),
            Self::Attribute { key, value } => write!(f, "{key}{value}"),
            Self::State(state) => write!(f, "state={state}"),
            Self::Nth(n) => write!(f, "nth={n}"),
            Self::ChildOf(p) => write!(f, "child_of({p})"),
            Self::DescendantOf(p) => write!(f, "descendant_of({p})"),
            Self::And(items) => join(f, items, " & "),
            Self::Or(items) => join(f, items, " | "),
            Self::Not(p) => write!(f, "!{p}"),
            Self::Custom(c) => write!(f, "custom({})", c.description),
        }
    }
}

impl BitAnd for Predicate {
    type Output = Predicate;

    fn bitand(self, rhs: Predicate) -> Predicate {
        self.and(rhs)
    }
}

impl BitOr for Predicate {
    type Output = Predicate;

    fn bitor(self, rhs: Predicate) -> Predicate {
        self.or(rhs)
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        self.negate()
    }
}

/// Predicate constructors.
///
/// ```
/// use sondeo::{by, Role};
///
/// let submit = by::role(Role::PushButton) & by::name("Submit");
/// assert_eq!(submit.to_string(), r#"(role="push button" & name="Submit")"#);
/// ```
pub mod by {
    use super::{CustomPredicate, Predicate, TextMatch};
    use crate::element::{ElementHandle, Role, State, TreePath};
    use crate::result::SondeoResult;

    /// Every element
    #[must_use]
    pub const fn any() -> Predicate {
        Predicate::Any
    }

    /// Only the element the traversal starts from
    #[must_use]
    pub const fn scope_root() -> Predicate {
        Predicate::ScopeRoot
    }

    /// Elements with the role
    #[must_use]
    pub const fn role(role: Role) -> Predicate {
        Predicate::Role(role)
    }

    /// Elements whose name equals (or, for a [`TextMatch`], satisfies) `name`
    #[must_use]
    pub fn name(name: impl Into<TextMatch>) -> Predicate {
        Predicate::Name(name.into())
    }

    /// Elements whose name contains `needle`
    #[must_use]
    pub fn name_contains(needle: impl Into<String>) -> Predicate {
        Predicate::Name(TextMatch::contains(needle))
    }

    /// Elements whose whole name matches the regular expression
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile.
    pub fn name_matching(pattern: &str) -> SondeoResult<Predicate> {
        Ok(Predicate::Name(TextMatch::pattern(pattern)?))
    }

    /// Elements whose text equals `text`
    #[must_use]
    pub fn text(text: impl Into<TextMatch>) -> Predicate {
        Predicate::Text(text.into())
    }

    /// Elements whose text contains `needle`
    #[must_use]
    pub fn text_contains(needle: impl Into<String>) -> Predicate {
        Predicate::Text(TextMatch::contains(needle))
    }

    /// Elements whose whole text matches the regular expression
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile.
    pub fn text_matching(pattern: &str) -> SondeoResult<Predicate> {
        Ok(Predicate::Text(TextMatch::pattern(pattern)?))
    }

    /// Elements with an attribute value
    #[must_use]
    pub fn attr(key: impl Into<String>, value: impl Into<TextMatch>) -> Predicate {
        Predicate::Attribute {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Elements with the state flag set
    #[must_use]
    pub const fn state(state: State) -> Predicate {
        Predicate::State(state)
    }

    /// The `n`-th of its siblings (negative counts from the last)
    #[must_use]
    pub const fn nth(n: i64) -> Predicate {
        Predicate::Nth(n)
    }

    /// Elements whose parent matches
    #[must_use]
    pub fn child_of(parent: Predicate) -> Predicate {
        Predicate::ChildOf(Box::new(parent))
    }

    /// Elements with an ancestor that matches
    #[must_use]
    pub fn descendant_of(ancestor: Predicate) -> Predicate {
        Predicate::DescendantOf(Box::new(ancestor))
    }

    /// Custom test
    pub fn custom<F>(description: impl Into<String>, test: F) -> Predicate
    where
        F: Fn(&ElementHandle, &TreePath) -> bool + Send + Sync + 'static,
    {
        Predicate::Custom(CustomPredicate::new(description, test))
    }
}

// =============================================================================
// RESULT SET
// =============================================================================

/// Ordered elements produced by one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    elements: Vec<ElementHandle>,
    origin: String,
}

impl ResultSet {
    /// Wrap elements with a description of where they came from
    #[must_use]
    pub fn new(elements: Vec<ElementHandle>, origin: impl Into<String>) -> Self {
        Self {
            elements,
            origin: origin.into(),
        }
    }

    /// Description of the producing query
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether nothing matched
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements in traversal order
    #[must_use]
    pub fn handles(&self) -> &[ElementHandle] {
        &self.elements
    }

    /// Take the elements
    #[must_use]
    pub fn into_handles(self) -> Vec<ElementHandle> {
        self.elements
    }

    /// First element, if any
    #[must_use]
    pub fn first(&self) -> Option<&ElementHandle> {
        self.elements.first()
    }

    /// Iterate in traversal order
    pub fn iter(&self) -> std::slice::Iter<'_, ElementHandle> {
        self.elements.iter()
    }
}

impl Index<usize> for ResultSet {
    type Output = ElementHandle;

    fn index(&self, index: usize) -> &ElementHandle {
        &self.elements[index]
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a ElementHandle;
    type IntoIter = std::slice::Iter<'a, ElementHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

// =============================================================================
// QUERY
// =============================================================================

/// Where a query starts its traversal
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    /// The subtree of a node, looked up by id
    Root(NodeId),
    /// The subtree of a previously observed element (re-read on evaluation)
    Element(ElementHandle),
    /// The subtrees of a frozen set of elements (each re-read on evaluation)
    Results(ResultSet),
    /// The subtrees of whatever another query yields when re-evaluated
    Query(Box<Query>),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(id) => write!(f, "root({id})"),
            Self::Element(el) => write!(f, "{el}"),
            Self::Results(set) => write!(f, "[{} result(s) of {}]", set.len(), set.origin()),
            Self::Query(q) => write!(f, "{q}"),
        }
    }
}

impl From<NodeId> for Scope {
    fn from(id: NodeId) -> Self {
        Self::Root(id)
    }
}

impl From<ElementHandle> for Scope {
    fn from(el: ElementHandle) -> Self {
        Self::Element(el)
    }
}

impl From<ResultSet> for Scope {
    fn from(set: ResultSet) -> Self {
        Self::Results(set)
    }
}

impl From<Query> for Scope {
    fn from(query: Query) -> Self {
        Self::Query(Box::new(query))
    }
}

/// Predicate applied to every element below a scope
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    scope: Scope,
    predicate: Predicate,
}

impl Query {
    /// Query `predicate` within `scope`
    #[must_use]
    pub fn new(scope: impl Into<Scope>, predicate: Predicate) -> Self {
        Self {
            scope: scope.into(),
            predicate,
        }
    }

    /// Narrow further: `predicate` within every result of this query
    #[must_use]
    pub fn objects_in(self, predicate: Predicate) -> Self {
        Self::new(self, predicate)
    }

    /// The scope
    #[must_use]
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The predicate
    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Traverse the live tree and collect matching elements in pre-order.
    ///
    /// # Errors
    ///
    /// Propagates service failures other than a vanished scope node.
    pub fn evaluate(&self, service: &dyn AccessibilityService) -> SondeoResult<ResultSet> {
        let scopes = self.scope_elements(service)?;
        let mut elements = Vec::new();
        for scope in &scopes {
            scope.walk(|el, ancestors| {
                if self.predicate.matches(el, ancestors) {
                    elements.push(el.clone());
                }
            });
        }
        tracing::debug!(
            query = %self,
            scopes = scopes.len(),
            matches = elements.len(),
            "evaluated query"
        );
        Ok(ResultSet::new(elements, self.to_string()))
    }

    fn scope_elements(
        &self,
        service: &dyn AccessibilityService,
    ) -> SondeoResult<Vec<ElementHandle>> {
        match &self.scope {
            Scope::Root(id) => {
                let path = position_of(service, id)?;
                Ok(recapture(service, id, path)?.into_iter().collect())
            }
            Scope::Element(el) => Ok(recapture(service, el.id(), el.path().clone())?
                .into_iter()
                .collect()),
            Scope::Results(set) => {
                let mut out = Vec::with_capacity(set.len());
                for el in set {
                    out.extend(recapture(service, el.id(), el.path().clone())?);
                }
                Ok(out)
            }
            Scope::Query(inner) => Ok(inner.evaluate(service)?.into_handles()),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} > {}", self.scope, self.predicate)
    }
}

/// Query `predicate` within `scope`
#[must_use]
pub fn objects_in(scope: impl Into<Scope>, predicate: Predicate) -> Query {
    Query::new(scope, predicate)
}

fn recapture(
    service: &dyn AccessibilityService,
    id: &NodeId,
    path: TreePath,
) -> SondeoResult<Option<ElementHandle>> {
    match ElementHandle::capture_at(service, id, path) {
        Ok(el) => Ok(Some(el)),
        Err(ServiceError::NodeNotFound(gone)) => {
            tracing::debug!(node = %gone, "scope node no longer exists");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Sibling position of a scope root, so `nth` works on it too
fn position_of(service: &dyn AccessibilityService, id: &NodeId) -> SondeoResult<TreePath> {
    let parent = match service.node(id) {
        Ok(info) => info.parent,
        Err(ServiceError::NodeNotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };
    let Some(parent) = parent else {
        return Ok(TreePath::root());
    };
    match service.node(&parent) {
        Ok(info) => Ok(info
            .children
            .iter()
            .position(|c| c == id)
            .map_or_else(TreePath::default, |index| {
                TreePath::new(vec![NthOf::new(index, info.children.len())])
            })),
        Err(ServiceError::NodeNotFound(_)) => Ok(TreePath::root()),
        Err(e) => Err(e.into()),
    }
}
