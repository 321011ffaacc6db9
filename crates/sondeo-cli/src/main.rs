//! Sondeador CLI: inspect and check accessibility-tree snapshots
//!
//! ## Usage
//!
//! ```bash
//! sondeador apps desktop.yaml                          # List applications
//! sondeador dump desktop.yaml --app contador           # Print the tree
//! sondeador query desktop.yaml --role label --format json
//! sondeador check desktop.yaml --script steps.yaml     # Run scripted steps
//! ```

use clap::Parser;
use sondeador::{
    handlers::{execute_apps, execute_check, execute_dump, execute_query},
    init_tracing, Cli, CliConfig, CliError, CliResult, ColorChoice, Commands, Verbosity,
};
use sondeo::SondeoConfig;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = build_config(&cli)?;
    init_tracing(config.verbosity);

    match cli.command {
        Commands::Dump(args) => execute_dump(&args),
        Commands::Apps(args) => execute_apps(&args),
        Commands::Query(args) => execute_query(&args),
        Commands::Check(args) => execute_check(&config, &args),
    }
}

fn build_config(cli: &Cli) -> CliResult<CliConfig> {
    let verbosity = Verbosity::from_count(cli.quiet, cli.verbose);
    let color: ColorChoice = cli.color.into();

    let session = match &cli.config {
        Some(path) => SondeoConfig::from_file(path)?,
        None => SondeoConfig::default(),
    }
    .with_env_overrides()
    .map_err(|e| CliError::config(e.to_string()))?;

    Ok(CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_session(session))
}
