//! Command handlers
//!
//! Each handler module contains the execution logic for one command and
//! its pure helpers.

pub mod check;
pub mod dump;
pub mod query;

pub use check::{execute_check, run_script, StepOutcome};
pub use dump::{execute_apps, execute_dump};
pub use query::{build_predicate, execute_query, QueryReport};

use std::path::Path;

use sondeo::{InMemoryDesktop, NodeId};

use crate::error::{CliError, CliResult};

/// Load a snapshot file into an in-memory desktop
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_desktop(path: &Path) -> CliResult<InMemoryDesktop> {
    Ok(InMemoryDesktop::load_snapshot(path)?)
}

/// Root of the application called `name`
///
/// # Errors
///
/// Returns [`CliError::AppNotFound`] when no application has that name.
pub fn find_app(desktop: &InMemoryDesktop, name: &str) -> CliResult<NodeId> {
    desktop
        .applications()
        .into_iter()
        .find(|(_, app)| app == name)
        .map(|(id, _)| id)
        .ok_or_else(|| CliError::app_not_found(name))
}

/// Root to work on: the named application, or the whole desktop
///
/// # Errors
///
/// See [`find_app`].
pub fn scope_root(desktop: &InMemoryDesktop, app: Option<&str>) -> CliResult<NodeId> {
    app.map_or_else(|| Ok(desktop.root()), |name| find_app(desktop, name))
}
