//! Check scripts and element matchers.
//!
//! ```yaml
//! app: contador
//! timeout_ms: 1000
//! steps:
//!   - expect: { text: "Has pulsado 0 veces" }
//!     on: { role: label }
//!     policy: any
//!   - perform: click
//!     on: { role: push button, name: Contar }
//!   - shows: { role: push button }
//!     within: [{ role: frame }]
//!     on: { role: filler }
//!     policy: all
//! ```
//!
//! Each step targets `on` (optionally inside the `within` chain) and does
//! exactly one of `perform`, `expect` (the targets match) or `shows` (the
//! targets or their descendants match). The policy defaults to exactly one.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sondeo::{by, Cardinality, Expectation, Operation, Predicate, Role, Session, State};

use crate::error::{CliError, CliResult};

/// Field-by-field description of the elements to match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatcherSpec {
    /// Role name
    pub role: Option<String>,
    /// Accessible name
    pub name: Option<String>,
    /// Text content
    pub text: Option<String>,
    /// Required state flags
    pub states: Vec<String>,
    /// Required attributes
    pub attributes: BTreeMap<String, String>,
    /// Position among siblings (negative counts from the end)
    pub nth: Option<i64>,
    /// Treat `name` and `text` as whole-value regular expressions
    pub regex: bool,
}

impl MatcherSpec {
    /// Conjunction of every field that is set; matches anything when empty
    ///
    /// # Errors
    ///
    /// Returns an error for unknown role or state names and invalid patterns.
    pub fn to_predicate(&self) -> CliResult<Predicate> {
        let mut parts = Vec::new();
        if let Some(role) = &self.role {
            parts.push(by::role(role.parse::<Role>()?));
        }
        if let Some(name) = &self.name {
            parts.push(if self.regex {
                by::name_matching(name)?
            } else {
                by::name(name.as_str())
            });
        }
        if let Some(text) = &self.text {
            parts.push(if self.regex {
                by::text_matching(text)?
            } else {
                by::text(text.as_str())
            });
        }
        for state in &self.states {
            parts.push(by::state(state.parse::<State>()?));
        }
        for (key, value) in &self.attributes {
            parts.push(by::attr(key.as_str(), value.as_str()));
        }
        if let Some(n) = self.nth {
            parts.push(by::nth(n));
        }
        Ok(parts
            .into_iter()
            .reduce(Predicate::and)
            .unwrap_or_else(by::any))
    }
}

/// One scripted step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Step {
    /// Enclosing scopes, outermost first
    pub within: Vec<MatcherSpec>,
    /// The targets
    pub on: MatcherSpec,
    /// Cardinality policy (first, any, all, one)
    pub policy: Option<String>,
    /// Action to perform on the targets
    pub perform: Option<String>,
    /// The targets must match this
    pub expect: Option<MatcherSpec>,
    /// The targets or their descendants must match this
    pub shows: Option<MatcherSpec>,
    /// Assertion time budget for this step
    pub timeout_ms: Option<u64>,
}

impl Step {
    /// Lower the step to an operation on `session`
    ///
    /// # Errors
    ///
    /// Returns an error when the step names zero or several things to do, or
    /// when a matcher or policy is invalid.
    pub fn to_operation(
        &self,
        session: &Session,
        default_timeout_ms: Option<u64>,
    ) -> CliResult<Operation> {
        let policy = match &self.policy {
            Some(name) => name.parse::<Cardinality>()?,
            None => Cardinality::ExactlyOne,
        };

        let mut selection = session.root();
        for scope in &self.within {
            selection = selection.objects_in(scope.to_predicate()?);
        }
        let mut targeted = selection
            .objects_in(self.on.to_predicate()?)
            .with_policy(policy);
        if let Some(ms) = self.timeout_ms.or(default_timeout_ms) {
            targeted = targeted.within_ms(ms);
        }

        match (&self.perform, &self.expect, &self.shows) {
            (Some(action), None, None) => Ok(targeted.to_perform(action.as_str())),
            (None, Some(m), None) => {
                Ok(targeted.to_verify(Expectation::Matches(m.to_predicate()?)))
            }
            (None, None, Some(m)) => {
                Ok(targeted.to_verify(Expectation::Shows(m.to_predicate()?)))
            }
            _ => Err(CliError::invalid_argument(
                "each step needs exactly one of perform, expect or shows",
            )),
        }
    }
}

/// A check script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckScript {
    /// Application the steps run against
    pub app: String,
    /// Default assertion time budget
    pub timeout_ms: Option<u64>,
    /// Steps in order
    pub steps: Vec<Step>,
}

impl CheckScript {
    /// Parse YAML
    ///
    /// # Errors
    ///
    /// Returns error if the YAML is invalid or the script has no application.
    pub fn from_yaml(yaml: &str) -> CliResult<Self> {
        let script: Self = serde_yaml_ng::from_str(yaml)?;
        if script.app.is_empty() {
            return Err(CliError::invalid_argument("script must name an app"));
        }
        Ok(script)
    }

    /// Load a YAML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> CliResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sondeo::{InMemoryDesktop, NodeSpec, OperationKind};
    use std::sync::Arc;

    fn session() -> Session {
        let d = Arc::new(InMemoryDesktop::new());
        let app = d.add_application("contador");
        d.add_node(
            &app,
            NodeSpec::new(Role::PushButton).name("Contar").action("click"),
        )
        .unwrap();
        Session::attach(d, app)
    }

    mod matcher_tests {
        use super::*;

        #[test]
        fn test_empty_matches_anything() {
            assert_eq!(MatcherSpec::default().to_predicate().unwrap(), by::any());
        }

        #[test]
        fn test_fields_are_conjoined() {
            let spec = MatcherSpec {
                role: Some("push button".to_string()),
                name: Some("Contar".to_string()),
                states: vec!["enabled".to_string()],
                ..MatcherSpec::default()
            };
            let expected =
                by::role(Role::PushButton) & by::name("Contar") & by::state(State::Enabled);
            assert_eq!(spec.to_predicate().unwrap(), expected);
        }

        #[test]
        fn test_unknown_role_hint() {
            let spec = MatcherSpec {
                role: Some("button".to_string()),
                ..MatcherSpec::default()
            };
            let err = spec.to_predicate().unwrap_err();
            assert!(err.to_string().contains("'button' is not a role name"));
            assert!(err.to_string().contains("push button"));
        }

        #[test]
        fn test_regex_fields() {
            let spec = MatcherSpec {
                text: Some("Has pulsado [0-9]+ veces".to_string()),
                regex: true,
                ..MatcherSpec::default()
            };
            let shown = spec.to_predicate().unwrap().to_string();
            assert!(shown.contains("/Has pulsado"));

            let bad = MatcherSpec {
                name: Some("(".to_string()),
                regex: true,
                ..MatcherSpec::default()
            };
            assert!(bad.to_predicate().is_err());
        }
    }

    mod step_tests {
        use super::*;

        #[test]
        fn test_perform_step_defaults_to_exactly_one() {
            let step: Step =
                serde_yaml_ng::from_str("perform: click\non: { role: push button }\n").unwrap();
            let op = step.to_operation(&session(), None).unwrap();
            assert_eq!(op.policy, Cardinality::ExactlyOne);
            assert!(matches!(op.kind, OperationKind::Perform { ref action } if action == "click"));
        }

        #[test]
        fn test_expect_step_uses_timeout() {
            let step: Step = serde_yaml_ng::from_str(
                "expect: { name: Contar }\non: { role: push button }\npolicy: any\n",
            )
            .unwrap();
            let op = step.to_operation(&session(), Some(250)).unwrap();
            assert_eq!(op.policy, Cardinality::Any);
            match op.kind {
                OperationKind::Verify { expectation, config } => {
                    assert!(matches!(expectation, Expectation::Matches(_)));
                    assert_eq!(config.unwrap().timeout_ms, 250);
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn test_step_needs_one_kind() {
            let step: Step = serde_yaml_ng::from_str(
                "perform: click\nshows: { name: x }\non: { role: label }\n",
            )
            .unwrap();
            assert!(step.to_operation(&session(), None).is_err());
            assert!(Step::default().to_operation(&session(), None).is_err());
        }

        #[test]
        fn test_unknown_policy() {
            let step: Step =
                serde_yaml_ng::from_str("perform: click\npolicy: some\n").unwrap();
            let err = step.to_operation(&session(), None).unwrap_err();
            assert!(err.to_string().contains("'some' is not a cardinality policy"));
        }
    }

    mod script_tests {
        use super::*;

        #[test]
        fn test_parse_script() {
            let script = CheckScript::from_yaml(
                "app: contador\ntimeout_ms: 100\nsteps:\n  - perform: click\n    on: { name: Contar }\n",
            )
            .unwrap();
            assert_eq!(script.app, "contador");
            assert_eq!(script.steps.len(), 1);
        }

        #[test]
        fn test_script_requires_app() {
            assert!(CheckScript::from_yaml("steps: []\n").is_err());
        }

        #[test]
        fn test_unknown_field_rejected() {
            assert!(CheckScript::from_yaml("app: x\nstepz: []\n").is_err());
        }
    }
}
