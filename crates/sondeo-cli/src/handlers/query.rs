//! Query command handler

use serde::Serialize;
use sondeo::{
    objects_in, resolve, Cardinality, ElementSummary, InMemoryDesktop, Predicate, Purpose,
};

use super::{load_desktop, scope_root};
use crate::commands::{QueryArgs, QueryOutputFormat};
use crate::error::CliResult;
use crate::script::MatcherSpec;

/// Resolved query, as printed by the query command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryReport {
    /// The query as evaluated
    pub query: String,
    /// Policy applied
    pub policy: Cardinality,
    /// Elements the query matched before resolution
    pub matched: usize,
    /// Elements selected by the policy
    pub elements: Vec<ElementSummary>,
}

/// Execute the query command
///
/// # Errors
///
/// Returns an error for unknown roles or states, invalid patterns, a missing
/// app, or when the policy rejects the match set.
pub fn execute_query(args: &QueryArgs) -> CliResult<()> {
    let desktop = load_desktop(&args.snapshot)?;
    let report = run_query(&desktop, args)?;
    match args.format {
        QueryOutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        QueryOutputFormat::Text => print!("{}", render_report(&report)),
    }
    Ok(())
}

/// Predicate described by the command-line filters
///
/// # Errors
///
/// Returns an error for unknown role or state names and invalid patterns.
pub fn build_predicate(args: &QueryArgs) -> CliResult<Predicate> {
    MatcherSpec {
        role: args.role.clone(),
        name: args.name.clone(),
        text: args.text.clone(),
        states: args.states.clone(),
        regex: args.regex,
        ..MatcherSpec::default()
    }
    .to_predicate()
}

/// Evaluate and resolve the query described by `args`
///
/// # Errors
///
/// See [`execute_query`].
pub fn run_query(desktop: &InMemoryDesktop, args: &QueryArgs) -> CliResult<QueryReport> {
    let root = scope_root(desktop, args.app.as_deref())?;
    let query = objects_in(root, build_predicate(args)?);
    let set = query.evaluate(desktop)?;
    let policy = Cardinality::from(args.policy);
    // inspection only: an empty `all` is a valid answer
    let resolved = resolve(&set, policy, Purpose::Assertion).map_err(sondeo::SondeoError::from)?;
    Ok(QueryReport {
        query: query.to_string(),
        policy,
        matched: set.len(),
        elements: resolved.handles().iter().map(|h| h.summary()).collect(),
    })
}

/// Text rendering: one element per line and a tally
#[must_use]
pub fn render_report(report: &QueryReport) -> String {
    let mut output = String::new();
    for element in &report.elements {
        output.push_str(&format!("{:>6}  {element}\n", element.id.as_str()));
    }
    output.push_str(&format!(
        "{} of {} match(es) selected ({})\n",
        report.elements.len(),
        report.matched,
        report.policy
    ));
    output
}
