//! Sondeador: command-line front end for Sondeo
//!
//! Works on snapshot files (YAML or JSON trees loaded into an in-memory
//! desktop): dump the tree, list applications, run queries and check
//! scripted steps.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;
pub mod script;

pub use commands::{
    AppsArgs, CheckArgs, Cli, ColorArg, Commands, DumpArgs, PolicyArg, QueryArgs,
    QueryOutputFormat,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::Reporter;
pub use script::{CheckScript, MatcherSpec, Step};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the stderr logger. `RUST_LOG` wins over the `-v` level.
pub fn init_tracing(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity.is_verbose());

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}
