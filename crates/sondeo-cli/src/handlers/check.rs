//! Check command handler

use std::sync::Arc;

use sondeo::{Outcome, Session};

use super::{find_app, load_desktop};
use crate::commands::CheckArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::Reporter;
use crate::script::CheckScript;

/// What happened to one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step held
    Passed {
        /// Step description
        description: String,
        /// Short evidence, e.g. "1 target" or "3 polls"
        detail: String,
    },
    /// The step failed
    Failed {
        /// Step description (the step number when it could not be built)
        description: String,
        /// Error message
        error: String,
    },
    /// Not run after an earlier failure
    Skipped {
        /// Step number
        index: usize,
    },
}

impl StepOutcome {
    /// Whether the step failed
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Execute the check command
///
/// # Errors
///
/// Returns an error if the inputs cannot be loaded, and
/// [`CliError::CheckFailed`] when a step failed.
pub fn execute_check(config: &CliConfig, args: &CheckArgs) -> CliResult<()> {
    let script = CheckScript::from_file(&args.script)?;
    let desktop = Arc::new(load_desktop(&args.snapshot)?);
    let app = find_app(&desktop, &script.app)?;
    let session = Session::attach(desktop, app).with_config(config.session);

    let outcomes = run_script(&session, &script, args.fail_fast);
    let reporter = Reporter::from_config(config);
    let mut failed = 0;
    let mut skipped = 0;
    for outcome in &outcomes {
        match outcome {
            StepOutcome::Passed {
                description,
                detail,
            } => reporter.success(&format!("{description} ({detail})")),
            StepOutcome::Failed { description, error } => {
                failed += 1;
                reporter.failure(description, error);
            }
            StepOutcome::Skipped { index } => {
                skipped += 1;
                reporter.skipped(&format!("step {index}"));
            }
        }
    }
    reporter.summary(outcomes.len() - failed - skipped, failed, skipped);

    if failed > 0 {
        return Err(CliError::CheckFailed {
            failed,
            total: outcomes.len() - skipped,
        });
    }
    Ok(())
}

/// Run every step in order against `session`
#[must_use]
pub fn run_script(session: &Session, script: &CheckScript, fail_fast: bool) -> Vec<StepOutcome> {
    let mut outcomes = Vec::with_capacity(script.steps.len());
    let mut stop = false;
    for (i, step) in script.steps.iter().enumerate() {
        let index = i + 1;
        if stop {
            outcomes.push(StepOutcome::Skipped { index });
            continue;
        }

        let op = match step.to_operation(session, script.timeout_ms) {
            Ok(op) => op,
            Err(e) => {
                outcomes.push(StepOutcome::Failed {
                    description: format!("step {index}"),
                    error: e.to_string(),
                });
                stop = fail_fast;
                continue;
            }
        };
        let description = op.to_string();
        tracing::info!(step = index, operation = %description, "running step");

        let outcome = match session.execute(&op) {
            Ok(Outcome::Performed(report)) => StepOutcome::Passed {
                description,
                detail: format!("{} target(s)", report.succeeded()),
            },
            Ok(Outcome::Verified(report)) => StepOutcome::Passed {
                description,
                detail: format!("{} poll(s)", report.attempts),
            },
            Err(e) => StepOutcome::Failed {
                description,
                error: e.to_string(),
            },
        };
        stop = fail_fast && outcome.is_failure();
        outcomes.push(outcome);
    }
    outcomes
}
