//! Step and status reporting

use console::{style, Term};

use crate::config::CliConfig;

/// Writes status lines to stdout with optional color
#[derive(Debug)]
pub struct Reporter {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl Reporter {
    /// Create a new reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stdout(),
            use_color,
            quiet,
        }
    }

    /// Reporter matching the CLI settings
    #[must_use]
    pub fn from_config(config: &CliConfig) -> Self {
        Self::new(config.color.should_color(), config.verbosity.is_quiet())
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a failure message with its detail indented below
    pub fn failure(&self, message: &str, detail: &str) {
        // Always print failures, even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
        for line in detail.lines() {
            let _ = self.term.write_line(&format!("    {line}"));
        }
    }

    /// Print a skipped step
    pub fn skipped(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("-").yellow().bold().to_string()
        } else {
            "SKIP".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print the final tally
    pub fn summary(&self, passed: usize, failed: usize, skipped: usize) {
        let line = format!("{passed} passed, {failed} failed, {skipped} skipped");
        let styled = if !self.use_color {
            line
        } else if failed == 0 {
            style(line).green().bold().to_string()
        } else {
            style(line).red().bold().to_string()
        };
        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }
}
