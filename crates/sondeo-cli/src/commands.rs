//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Sondeador: inspect, query and check accessibility-tree snapshots
#[derive(Parser, Debug)]
#[command(name = "sondeador")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Session configuration file (YAML)
    #[arg(long, global = true, env = "SONDEO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the accessibility tree of a snapshot
    Dump(DumpArgs),

    /// List the applications on the snapshot desktop
    Apps(AppsArgs),

    /// Evaluate a query and resolve it with a cardinality policy
    Query(QueryArgs),

    /// Run a scripted list of perform/expect steps against a snapshot
    Check(CheckArgs),
}

/// Arguments for the dump command
#[derive(Parser, Debug)]
pub struct DumpArgs {
    /// Snapshot file (YAML or JSON)
    pub snapshot: PathBuf,

    /// Only dump this application
    #[arg(short, long)]
    pub app: Option<String>,

    /// Maximum depth to display
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Show state flags
    #[arg(long)]
    pub states: bool,
}

/// Arguments for the apps command
#[derive(Parser, Debug)]
pub struct AppsArgs {
    /// Snapshot file (YAML or JSON)
    pub snapshot: PathBuf,
}

/// Arguments for the query command
#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// Snapshot file (YAML or JSON)
    pub snapshot: PathBuf,

    /// Application to search in (whole desktop when absent)
    #[arg(short, long)]
    pub app: Option<String>,

    /// Role name, e.g. "push button"
    #[arg(long)]
    pub role: Option<String>,

    /// Accessible name
    #[arg(long)]
    pub name: Option<String>,

    /// Text content
    #[arg(long)]
    pub text: Option<String>,

    /// Required state flag (repeatable)
    #[arg(long = "state")]
    pub states: Vec<String>,

    /// Treat --name and --text as regular expressions matching the whole value
    #[arg(long)]
    pub regex: bool,

    /// Cardinality policy
    #[arg(short, long, default_value = "all")]
    pub policy: PolicyArg,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: QueryOutputFormat,
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Snapshot file (YAML or JSON)
    pub snapshot: PathBuf,

    /// Steps file (YAML)
    #[arg(short, long)]
    pub script: PathBuf,

    /// Stop at the first failing step
    #[arg(long)]
    pub fail_fast: bool,
}

/// Cardinality policy argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolicyArg {
    /// First match in traversal order
    First,
    /// Every match, one is enough
    Any,
    /// Every match, all must hold
    #[default]
    All,
    /// Exactly one match
    #[value(alias = "exactly-one")]
    One,
}

impl From<PolicyArg> for sondeo::Cardinality {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::First => Self::First,
            PolicyArg::Any => Self::Any,
            PolicyArg::All => Self::All,
            PolicyArg::One => Self::ExactlyOne,
        }
    }
}

/// Query output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryOutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}

/// Color output argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sondeo::Cardinality;

    #[test]
    fn test_parse_dump() {
        let cli = Cli::try_parse_from(["sondeador", "dump", "tree.yaml", "--app", "contador"])
            .unwrap();
        match cli.command {
            Commands::Dump(args) => {
                assert_eq!(args.snapshot, PathBuf::from("tree.yaml"));
                assert_eq!(args.app.as_deref(), Some("contador"));
                assert_eq!(args.depth, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from([
            "sondeador",
            "-vv",
            "query",
            "tree.yaml",
            "--role",
            "push button",
            "--state",
            "enabled",
            "--state",
            "focused",
            "--policy",
            "exactly-one",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Query(args) => {
                assert_eq!(args.role.as_deref(), Some("push button"));
                assert_eq!(args.states, vec!["enabled", "focused"]);
                assert_eq!(Cardinality::from(args.policy), Cardinality::ExactlyOne);
                assert_eq!(args.format, QueryOutputFormat::Json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_check_requires_script() {
        assert!(Cli::try_parse_from(["sondeador", "check", "tree.yaml"]).is_err());
    }

    #[test]
    fn test_default_policy_is_all() {
        let cli = Cli::try_parse_from(["sondeador", "query", "tree.yaml"]).unwrap();
        let Commands::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(args.policy, PolicyArg::All);
    }
}
