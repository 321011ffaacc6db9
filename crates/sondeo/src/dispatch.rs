//! Action dispatcher.
//!
//! Runs a named input action on resolved handles, one at a time in traversal
//! order. Each target is re-validated against the service just before its
//! action is submitted, so a node that vanished (or was replaced by a node of
//! another role) since the query ran is reported as stale instead of
//! receiving input meant for something else.

use serde::{Deserialize, Serialize};

use crate::element::{ElementHandle, ElementSummary};
use crate::resolve::{Cardinality, Resolved};
use crate::result::{ActionError, ActionFailure, IndexedFailure, ServiceError, SondeoResult};
use crate::service::AccessibilityService;

/// Outcome of the action on one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleOutcome {
    /// Position in the resolved set
    pub index: usize,
    /// The target as it was observed by the query
    pub target: ElementSummary,
    /// Per-target result
    pub result: Result<(), ActionFailure>,
}

impl HandleOutcome {
    /// Whether the action went through
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-target outcomes of one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    /// Action name
    pub action: String,
    /// Policy the targets were resolved with
    pub policy: Cardinality,
    /// One entry per attempted target, in traversal order
    pub outcomes: Vec<HandleOutcome>,
}

impl ActionReport {
    /// Number of targets that accepted the action
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    /// Every failure with its index
    #[must_use]
    pub fn failures(&self) -> Vec<IndexedFailure> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.result.as_ref().err().map(|failure| IndexedFailure {
                    index: o.index,
                    failure: failure.clone(),
                })
            })
            .collect()
    }

    /// `Any` succeeds when one target accepted; the other policies need
    /// every target to accept.
    #[must_use]
    pub fn is_success(&self) -> bool {
        if self.outcomes.is_empty() {
            return false;
        }
        match self.policy {
            Cardinality::Any => self.succeeded() > 0,
            Cardinality::First | Cardinality::All | Cardinality::ExactlyOne => {
                self.succeeded() == self.outcomes.len()
            }
        }
    }

    /// Turn an unsuccessful report into [`SondeoError::Action`](crate::SondeoError::Action).
    ///
    /// # Errors
    ///
    /// Returns the composite error listing every per-target failure.
    pub fn into_result(self) -> SondeoResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ActionError {
                failures: self.failures(),
                action: self.action,
                policy: self.policy,
                attempted: self.outcomes.len(),
            }
            .into())
        }
    }
}

/// Submit `action` to every resolved handle and collect the outcomes.
///
/// Failures do not stop the loop: every target is attempted.
pub fn perform(
    service: &dyn AccessibilityService,
    action: &str,
    resolved: &Resolved,
) -> ActionReport {
    let outcomes = resolved
        .handles()
        .iter()
        .enumerate()
        .map(|(index, handle)| {
            let result = perform_one(service, action, handle);
            match &result {
                Ok(()) => tracing::info!(action, target = %handle, index, "dispatched action"),
                Err(failure) => tracing::warn!(action, index, %failure, "action failed"),
            }
            HandleOutcome {
                index,
                target: handle.summary(),
                result,
            }
        })
        .collect();
    ActionReport {
        action: action.to_string(),
        policy: resolved.policy(),
        outcomes,
    }
}

fn perform_one(
    service: &dyn AccessibilityService,
    action: &str,
    handle: &ElementHandle,
) -> Result<(), ActionFailure> {
    let stale = |reason: String| ActionFailure::StaleTarget {
        target: handle.summary(),
        reason,
    };
    let rejected = |reason: String| ActionFailure::Rejected {
        target: handle.summary(),
        action: action.to_string(),
        reason,
    };

    let current = match service.node(handle.id()) {
        Ok(info) => info,
        Err(ServiceError::NodeNotFound(_)) => {
            return Err(stale("node no longer exists".to_string()))
        }
        Err(e) => return Err(rejected(e.to_string())),
    };
    if current.role != handle.role() {
        return Err(stale(format!(
            "role changed from {} to {}",
            handle.role(),
            current.role
        )));
    }
    if !current.actions.iter().any(|a| a == action) {
        let available = if current.actions.is_empty() {
            "none".to_string()
        } else {
            current.actions.join(", ")
        };
        return Err(rejected(format!("available actions: {available}")));
    }

    service.do_action(handle.id(), action).map_err(|e| match e {
        ServiceError::NodeNotFound(_) => stale("node no longer exists".to_string()),
        ServiceError::ActionRejected { message, .. } => rejected(message),
        ServiceError::Unavailable(_) => rejected(e.to_string()),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::desktop::{InMemoryDesktop, NodeSpec};
    use crate::element::{NodeId, Role};
    use crate::query::{by, objects_in};
    use crate::resolve::{resolve, Purpose};

    fn three_buttons() -> (InMemoryDesktop, NodeId, Vec<NodeId>) {
        let d = InMemoryDesktop::new();
        let app = d.add_application("buttons");
        let ids = (0..3)
            .map(|i| {
                d.add_node(
                    &app,
                    NodeSpec::new(Role::PushButton)
                        .name(format!("b{i}"))
                        .action("click"),
                )
                .unwrap()
            })
            .collect();
        (d, app, ids)
    }

    fn resolved(d: &InMemoryDesktop, app: &NodeId, policy: Cardinality) -> Resolved {
        let set = objects_in(app.clone(), by::role(Role::PushButton))
            .evaluate(d)
            .unwrap();
        resolve(&set, policy, Purpose::Action).unwrap()
    }

    #[test]
    fn test_all_continues_past_failure() {
        let (d, app, ids) = three_buttons();
        d.on_action(&ids[1], "click", |_| Err("busy".to_string()));
        let report = perform(&d, "click", &resolved(&d, &app, Cardinality::All));

        assert_eq!(d.dispatched().len(), 3);
        assert_eq!(report.succeeded(), 2);
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert!(!report.is_success());

        let err = report.into_result().unwrap_err();
        let action = err.as_action().unwrap();
        assert_eq!(action.attempted, 3);
        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn test_any_tolerates_partial_failure() {
        let (d, app, ids) = three_buttons();
        d.on_action(&ids[0], "click", |_| Err("busy".to_string()));
        let report = perform(&d, "click", &resolved(&d, &app, Cardinality::Any));
        assert!(report.is_success());
        assert_eq!(report.failures().len(), 1);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_any_fails_when_everything_fails() {
        let (d, app, ids) = three_buttons();
        for id in &ids {
            d.on_action(id, "click", |_| Err("busy".to_string()));
        }
        let report = perform(&d, "click", &resolved(&d, &app, Cardinality::Any));
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_first_single_attempt() {
        let (d, app, ids) = three_buttons();
        let report = perform(&d, "click", &resolved(&d, &app, Cardinality::First));
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(d.dispatched()[0].node, ids[0]);
    }

    #[test]
    fn test_vanished_target_is_stale() {
        let (d, app, ids) = three_buttons();
        let targets = resolved(&d, &app, Cardinality::All);
        d.remove_node(&ids[2]).unwrap();
        let report = perform(&d, "click", &targets);
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 2);
        assert!(matches!(
            failures[0].failure,
            ActionFailure::StaleTarget { .. }
        ));
    }

    #[test]
    fn test_role_change_is_stale() {
        let (d, app, ids) = three_buttons();
        let targets = resolved(&d, &app, Cardinality::First);
        d.update(&ids[0], |info| info.role = Role::Label).unwrap();
        let report = perform(&d, "click", &targets);
        let failure = &report.failures()[0].failure;
        assert!(failure.to_string().contains("role changed from push button to label"));
        assert!(d.dispatched().is_empty());
    }

    #[test]
    fn test_missing_action_lists_available() {
        let (d, app, _) = three_buttons();
        let report = perform(&d, "press", &resolved(&d, &app, Cardinality::First));
        let failure = &report.failures()[0].failure;
        assert!(matches!(failure, ActionFailure::Rejected { .. }));
        assert!(failure.to_string().contains("available actions: click"));
    }
}
