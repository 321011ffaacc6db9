//! Dump and apps command handlers

use sondeo::{render_tree, ElementHandle, InMemoryDesktop, RenderOptions};

use super::{load_desktop, scope_root};
use crate::commands::{AppsArgs, DumpArgs};
use crate::error::CliResult;

/// Execute the dump command
///
/// # Errors
///
/// Returns an error if the snapshot cannot be loaded or the app is missing.
pub fn execute_dump(args: &DumpArgs) -> CliResult<()> {
    let desktop = load_desktop(&args.snapshot)?;
    let options = RenderOptions::default()
        .with_depth(args.depth)
        .with_states(args.states);
    print!("{}", dump_text(&desktop, args.app.as_deref(), &options)?);
    Ok(())
}

/// Render the desktop, or one application, as a tree
///
/// # Errors
///
/// Returns an error if the app is missing.
pub fn dump_text(
    desktop: &InMemoryDesktop,
    app: Option<&str>,
    options: &RenderOptions,
) -> CliResult<String> {
    let root = scope_root(desktop, app)?;
    let handle = ElementHandle::capture(desktop, &root).map_err(sondeo::SondeoError::from)?;
    Ok(render_tree(&handle, options))
}

/// Execute the apps command
///
/// # Errors
///
/// Returns an error if the snapshot cannot be loaded.
pub fn execute_apps(args: &AppsArgs) -> CliResult<()> {
    let desktop = load_desktop(&args.snapshot)?;
    for name in app_names(&desktop) {
        println!("{name}");
    }
    Ok(())
}

/// Application names in desktop order
#[must_use]
pub fn app_names(desktop: &InMemoryDesktop) -> Vec<String> {
    desktop
        .applications()
        .into_iter()
        .map(|(_, name)| name)
        .collect()
}
