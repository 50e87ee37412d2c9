//! Configuration file handling.
//!
//! This module handles loading and validating fleet configuration from
//! `agents.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory collected outputs and the run summary are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Codebase handed to every agent; resolved to an absolute path.
    #[serde(default = "default_codebase")]
    pub codebase: String,

    /// Fleet-wide settings.
    #[serde(default)]
    pub settings: Settings,

    /// Ordered list of agents to run.
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            codebase: default_codebase(),
            settings: Settings::default(),
            agents: Vec::new(),
        }
    }
}

fn default_output_dir() -> String {
    "results".to_string()
}

fn default_codebase() -> String {
    ".".to_string()
}

/// Fleet-wide execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Per-step timeout in seconds, applied uniformly to every fetch,
    /// install, and run step of every agent.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Run agents concurrently instead of one at a time.
    #[serde(default)]
    pub parallel: bool,

    /// Cap on concurrently running agents in parallel mode.
    /// Defaults to the agent count when unset.
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            parallel: false,
            concurrency: None,
        }
    }
}

fn default_timeout() -> u64 {
    600 // clone + install of a typical agent fits well under 10 min
}

/// Descriptor for one external analysis agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Unique identifier; names the working directory and the output
    /// artifact.
    pub name: String,

    /// Git URL (or local path) the agent's code is fetched from.
    pub repository: String,

    /// Branch to fetch.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Shell command installing the agent's dependencies, executed inside
    /// its working directory.
    pub install_command: String,

    /// Shell command running the analysis; the codebase path is appended
    /// as its final argument.
    pub run_command: String,

    /// Path of the output file the run is expected to produce, relative
    /// to the agent's working directory.
    pub output_file: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref codebase) = args.codebase {
            self.codebase = codebase.to_string_lossy().into_owned();
        }
        if let Some(ref output_dir) = args.output_dir {
            self.output_dir = output_dir.to_string_lossy().into_owned();
        }
        if let Some(timeout) = args.timeout {
            self.settings.timeout = timeout;
        }
        if let Some(jobs) = args.jobs {
            self.settings.concurrency = Some(jobs);
        }

        // Mode flags only override if explicitly provided.
        if args.parallel {
            self.settings.parallel = true;
        } else if args.sequential {
            self.settings.parallel = false;
        }
    }

    /// Structural validation of the agent set.
    ///
    /// Rejects missing fields, names that are unsafe as directory names,
    /// and duplicate names (duplicates would silently clobber each
    /// other's working directories and artifacts).
    pub fn validate(&self) -> Result<(), String> {
        if self.settings.timeout == 0 {
            return Err("settings.timeout must be at least 1 second".to_string());
        }
        if self.settings.concurrency == Some(0) {
            return Err("settings.concurrency must be at least 1".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.name.is_empty() {
                return Err("agent name must not be empty".to_string());
            }
            if !is_filesystem_safe(&agent.name) {
                return Err(format!(
                    "agent name '{}' is not filesystem-safe (allowed: letters, digits, '.', '_', '-')",
                    agent.name
                ));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(format!("duplicate agent name '{}'", agent.name));
            }

            for (field, value) in [
                ("repository", &agent.repository),
                ("branch", &agent.branch),
                ("install_command", &agent.install_command),
                ("run_command", &agent.run_command),
                ("output_file", &agent.output_file),
            ] {
                if value.is_empty() {
                    return Err(format!("agent '{}' has an empty {}", agent.name, field));
                }
            }
        }

        Ok(())
    }

    /// Generate a default configuration file content with one example
    /// agent.
    pub fn default_toml() -> String {
        let mut config = Config::default();
        config.agents.push(AgentSpec {
            name: "example-agent".to_string(),
            repository: "https://github.com/acme/example-agent.git".to_string(),
            branch: "main".to_string(),
            install_command: "pip install -r requirements.txt".to_string(),
            run_command: "python analyze.py".to_string(),
            output_file: "report.json".to_string(),
        });

        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

/// Whether a name is safe to use as a directory and file name component.
fn is_filesystem_safe(name: &str) -> bool {
    !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
