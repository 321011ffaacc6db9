//! Session: the application under test and the executor of operations.
//!
//! A session holds the service handle, the application root and the
//! configuration. Every front-end (chaining, pipes, the `expect_*` and
//! `perform` sugar) ends in [`Session::execute`] or the two executor
//! functions behind it.

use std::fmt;
use std::sync::Arc;

use crate::config::SondeoConfig;
use crate::dispatch::{self, ActionReport};
use crate::element::{ElementHandle, NodeId};
use crate::pipeline::{Operation, OperationKind, Outcome, Selection, Targeted};
use crate::query::{by, Predicate, Query, ResultSet, Scope};
use crate::render::{render_tree, RenderOptions};
use crate::resolve::{resolve, Cardinality, Purpose};
use crate::result::{ServiceError, SondeoError, SondeoResult};
use crate::service::AccessibilityService;
use crate::verify::{self, Expectation, Poller, VerifyConfig, VerifyReport};

/// Connection to one application through an accessibility service
#[derive(Clone)]
pub struct Session {
    service: Arc<dyn AccessibilityService>,
    root: NodeId,
    config: SondeoConfig,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.root)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Attach to a known application root
    pub fn attach(service: Arc<dyn AccessibilityService>, root: NodeId) -> Self {
        Self {
            service,
            root,
            config: SondeoConfig::default(),
        }
    }

    /// Wait for an application named `name` to appear among the desktop's
    /// children and attach to it.
    ///
    /// # Errors
    ///
    /// Returns [`SondeoError::ApplicationNotFound`] when `config.app_wait`
    /// runs out, and service failures other than vanished nodes.
    pub fn find_application(
        service: Arc<dyn AccessibilityService>,
        name: &str,
        config: SondeoConfig,
    ) -> SondeoResult<Self> {
        let mut poller = Poller::new(&config.app_wait);
        loop {
            let attempt = poller.attempt();
            if let Some(root) = find_app_once(service.as_ref(), name)? {
                tracing::info!(name, node = %root, attempt, "application found");
                return Ok(Self {
                    service,
                    root,
                    config,
                });
            }
            tracing::trace!(name, attempt, "application not on the desktop yet");
            if !poller.wait() {
                tracing::warn!(name, attempts = attempt, "application did not appear");
                return Err(SondeoError::ApplicationNotFound {
                    name: name.to_string(),
                    timeout_ms: config.app_wait.timeout_ms,
                });
            }
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: SondeoConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &SondeoConfig {
        &self.config
    }

    /// The accessibility service
    #[must_use]
    pub fn service(&self) -> &dyn AccessibilityService {
        self.service.as_ref()
    }

    /// Id of the application root
    #[must_use]
    pub const fn root_id(&self) -> &NodeId {
        &self.root
    }

    /// The application root as a selection (start of a pipe)
    #[must_use]
    pub fn root(&self) -> Selection<'_> {
        Selection::new(self, Query::new(self.root.clone(), by::scope_root()))
    }

    /// Elements matching `predicate` anywhere in the application
    #[must_use]
    pub fn objects_in(&self, predicate: Predicate) -> Selection<'_> {
        self.root().objects_in(predicate)
    }

    /// Bind an arbitrary query to this session
    #[must_use]
    pub fn select(&self, query: Query) -> Selection<'_> {
        Selection::new(self, query)
    }

    /// Evaluate a query against the live tree
    ///
    /// # Errors
    ///
    /// Propagates service failures.
    pub fn evaluate(&self, query: &Query) -> SondeoResult<ResultSet> {
        query.evaluate(self.service())
    }

    /// Capture the application subtree as it is now
    ///
    /// # Errors
    ///
    /// Fails if the application root is gone.
    pub fn snapshot(&self) -> SondeoResult<ElementHandle> {
        Ok(ElementHandle::capture(self.service(), &self.root)?)
    }

    /// Render the application subtree for debugging
    ///
    /// # Errors
    ///
    /// Fails if the application root is gone.
    pub fn dump(&self, options: &RenderOptions) -> SondeoResult<String> {
        Ok(render_tree(&self.snapshot()?, options))
    }

    // =========================================================================
    // EXECUTOR
    // =========================================================================

    /// Run an operation
    ///
    /// # Errors
    ///
    /// Resolution errors, composite action errors, assertion timeouts and
    /// service failures.
    pub fn execute(&self, op: &Operation) -> SondeoResult<Outcome> {
        tracing::debug!(operation = %op, "executing");
        match &op.kind {
            OperationKind::Perform { action } => self
                .execute_perform(&op.query, op.policy, action)
                .map(Outcome::Performed),
            OperationKind::Verify {
                expectation,
                config,
            } => self
                .execute_verify(&op.query, op.policy, expectation, *config)
                .map(Outcome::Verified),
        }
    }

    pub(crate) fn execute_perform(
        &self,
        query: &Query,
        policy: Cardinality,
        action: &str,
    ) -> SondeoResult<ActionReport> {
        let set = query.evaluate(self.service())?;
        let resolved = resolve(&set, policy, Purpose::Action)?;
        dispatch::perform(self.service(), action, &resolved).into_result()
    }

    pub(crate) fn execute_verify(
        &self,
        query: &Query,
        policy: Cardinality,
        expectation: &Expectation,
        config: Option<VerifyConfig>,
    ) -> SondeoResult<VerifyReport> {
        let config = config.unwrap_or(self.config.verify);
        verify::verify(self.service(), query, policy, expectation, &config)
    }

    // =========================================================================
    // SUGAR
    // =========================================================================

    /// Assert on any element matching `predicate`
    #[must_use]
    pub fn expect_any(&self, predicate: Predicate) -> Targeted<'_> {
        self.objects_in(predicate).any()
    }

    /// Assert on every element matching `predicate`
    #[must_use]
    pub fn expect_all(&self, predicate: Predicate) -> Targeted<'_> {
        self.objects_in(predicate).all()
    }

    /// Assert on the first element matching `predicate`
    #[must_use]
    pub fn expect_first(&self, predicate: Predicate) -> Targeted<'_> {
        self.objects_in(predicate).first()
    }

    /// Assert on the only element matching `predicate`
    #[must_use]
    pub fn expect_one(&self, predicate: Predicate) -> Targeted<'_> {
        self.objects_in(predicate).exactly_one()
    }

    /// Start an action: `session.perform("click").on(by::name("Ok"))`
    #[must_use]
    pub fn perform(&self, action: impl Into<String>) -> PerformOn<'_> {
        PerformOn {
            session: self,
            action: action.into(),
        }
    }

    /// Anchor on the first element matching `predicate`
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::Empty`](crate::ResolutionError::Empty) if
    /// nothing matches.
    pub fn perform_on(&self, predicate: Predicate) -> SondeoResult<Interaction<'_>> {
        self.interaction(predicate, Cardinality::First)
    }

    /// Anchor on every element matching `predicate`
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::Empty`](crate::ResolutionError::Empty) if
    /// nothing matches.
    pub fn perform_on_all(&self, predicate: Predicate) -> SondeoResult<Interaction<'_>> {
        self.interaction(predicate, Cardinality::All)
    }

    fn interaction(
        &self,
        predicate: Predicate,
        policy: Cardinality,
    ) -> SondeoResult<Interaction<'_>> {
        let set = self.objects_in(predicate).evaluate()?;
        let resolved = resolve(&set, policy, Purpose::Action)?;
        Ok(Interaction {
            session: self,
            anchors: resolved.handles().to_vec(),
        })
    }
}

fn find_app_once(
    service: &dyn AccessibilityService,
    name: &str,
) -> SondeoResult<Option<NodeId>> {
    let desktop = service.desktop()?;
    let children = match service.node(&desktop) {
        Ok(info) => info.children,
        Err(ServiceError::NodeNotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    for child in children {
        match service.node(&child) {
            Ok(info) if info.name == name => return Ok(Some(child)),
            Ok(_) | Err(ServiceError::NodeNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

/// Pending action waiting for its targets
#[derive(Debug)]
pub struct PerformOn<'s> {
    session: &'s Session,
    action: String,
}

impl PerformOn<'_> {
    /// On the only element matching `predicate`
    ///
    /// # Errors
    ///
    /// See [`Targeted::perform`].
    pub fn on(self, predicate: Predicate) -> SondeoResult<ActionReport> {
        self.session.objects_in(predicate).exactly_one().perform(self.action)
    }

    /// On the first element matching `predicate`
    ///
    /// # Errors
    ///
    /// See [`Targeted::perform`].
    pub fn on_first(self, predicate: Predicate) -> SondeoResult<ActionReport> {
        self.session.objects_in(predicate).first().perform(self.action)
    }

    /// On every element matching `predicate`, succeeding if one accepts
    ///
    /// # Errors
    ///
    /// See [`Targeted::perform`].
    pub fn on_any(self, predicate: Predicate) -> SondeoResult<ActionReport> {
        self.session.objects_in(predicate).any().perform(self.action)
    }

    /// On every element matching `predicate`, all of which must accept
    ///
    /// # Errors
    ///
    /// See [`Targeted::perform`].
    pub fn on_all(self, predicate: Predicate) -> SondeoResult<ActionReport> {
        self.session.objects_in(predicate).all().perform(self.action)
    }
}

/// Interactions anchored on previously found elements.
///
/// Each anchor is a subtree root; `perform_below` acts on the first matching
/// element inside every anchor and `shows` reports, per anchor, whether a
/// matching element is present.
#[derive(Debug, Clone)]
pub struct Interaction<'s> {
    session: &'s Session,
    anchors: Vec<ElementHandle>,
}

impl Interaction<'_> {
    /// The anchor elements
    #[must_use]
    pub fn anchors(&self) -> &[ElementHandle] {
        &self.anchors
    }

    /// Perform `action` on the first element matching `predicate` inside
    /// each anchor.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::Empty`](crate::ResolutionError::Empty) if
    /// some anchor holds no match (before anything is dispatched), and the
    /// composite action error when a target fails.
    pub fn perform_below(
        &self,
        action: &str,
        predicate: Predicate,
    ) -> SondeoResult<ActionReport> {
        let mut targets = Vec::with_capacity(self.anchors.len());
        for anchor in &self.anchors {
            let set = self
                .within(anchor, predicate.clone())
                .evaluate(self.session.service())?;
            let first = resolve(&set, Cardinality::First, Purpose::Action)?;
            targets.extend_from_slice(first.handles());
        }
        let origin = format!("{predicate} below {} anchor(s)", self.anchors.len());
        let set = ResultSet::new(targets, origin);
        let resolved = resolve(&set, Cardinality::All, Purpose::Action)?;
        dispatch::perform(self.session.service(), action, &resolved).into_result()
    }

    /// Whether each anchor currently shows an element matching `predicate`
    ///
    /// # Errors
    ///
    /// Propagates service failures.
    pub fn shows(&self, predicate: &Predicate) -> SondeoResult<Vec<bool>> {
        self.anchors
            .iter()
            .map(|anchor| {
                let set = self
                    .within(anchor, predicate.clone())
                    .evaluate(self.session.service())?;
                Ok(!set.is_empty())
            })
            .collect()
    }

    fn within(&self, anchor: &ElementHandle, predicate: Predicate) -> Query {
        Query::new(Scope::Element(anchor.clone()), predicate)
    }
}
