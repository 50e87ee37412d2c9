//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// AgentFleet - run a fleet of git-hosted analysis agents
///
/// Fetches, installs, and runs every agent listed in the fleet
/// configuration against a shared codebase, collecting each agent's
/// declared output file into a results directory.
///
/// Examples:
///   agentfleet
///   agentfleet --config fleet/agents.toml --codebase ./my-project
///   agentfleet --parallel --jobs 4 --timeout 300
///   agentfleet --only lint-agent,sec-agent --dry-run
///   agentfleet --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the fleet configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "agents.toml",
        env = "AGENTFLEET_CONFIG"
    )]
    pub config: PathBuf,

    /// Codebase directory handed to every agent
    ///
    /// Overrides the `codebase` setting from the configuration file.
    #[arg(long, value_name = "DIR")]
    pub codebase: Option<PathBuf>,

    /// Directory collected outputs are written to
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Per-step timeout in seconds
    ///
    /// Applied uniformly to every fetch, install, and run step.
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Run agents concurrently
    ///
    /// Overrides the configuration file setting.
    #[arg(long, conflicts_with = "sequential")]
    pub parallel: bool,

    /// Run agents one at a time in configuration order
    ///
    /// Overrides the configuration file setting.
    #[arg(long, conflicts_with = "parallel")]
    pub sequential: bool,

    /// Maximum number of agents running at once in parallel mode
    ///
    /// Defaults to the agent count.
    #[arg(short = 'j', long, value_name = "NUM")]
    pub jobs: Option<usize>,

    /// Only run the named agents (comma-separated)
    ///
    /// Example: --only lint-agent,sec-agent
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub only: Option<Vec<String>>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the resolved plan without fetching or running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default agents.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if !self.config.exists() {
            return Err(format!(
                "Configuration file not found: {} (generate one with --init-config)",
                self.config.display()
            ));
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(jobs) = self.jobs {
            if jobs == 0 {
                return Err("Jobs must be at least 1".to_string());
            }
        }

        if let Some(ref only) = self.only {
            if only.iter().any(|name| name.trim().is_empty()) {
                return Err("--only contains an empty agent name".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate codebase directory if provided
        if let Some(ref codebase) = self.codebase {
            if !codebase.exists() {
                return Err(format!(
                    "Codebase directory does not exist: {}",
                    codebase.display()
                ));
            }
            if !codebase.is_dir() {
                return Err(format!(
                    "Codebase path is not a directory: {}",
                    codebase.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
