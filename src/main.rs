//! AgentFleet - Fleet runner for git-hosted analysis agents
//!
//! A CLI tool that fetches, installs, and runs a configured set of
//! external analysis agents against a shared codebase, collecting each
//! agent's declared output file into a results directory.
//!
//! Exit codes:
//!   0 - Every agent produced its output artifact
//!   1 - Runtime error (config, validation, I/O) before the fleet ran
//!   2 - The fleet ran but at least one agent produced no artifact

mod cli;
mod config;
mod exec;
mod models;
mod orchestrator;
mod repo;
mod report;
mod runner;
#[cfg(test)]
mod testutil;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::Args;
use config::{AgentSpec, Config};
use models::{FleetReport, RunSummary};
use orchestrator::Mode;
use runner::RunContext;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("AgentFleet v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the fleet
    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Fleet run failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default agents.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new("agents.toml");

    if path.exists() {
        eprintln!("⚠️  agents.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write agents.toml")?;

    println!("✅ Created agents.toml with an example agent.");
    println!("   Edit it to list your agents, codebase, and timeout.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete fleet workflow. Returns exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration and apply CLI overrides
    info!("Loading config from: {}", args.config.display());
    let mut config = Config::load(&args.config)?;
    config.merge_with_args(&args);
    config.validate().map_err(anyhow::Error::msg)?;

    let agents = select_agents(&config, &args)?;
    if agents.is_empty() {
        println!("⚠️  No agents configured. Nothing to do.");
        return Ok(0);
    }

    // Resolve directories before any agent starts
    let codebase = std::fs::canonicalize(&config.codebase)
        .with_context(|| format!("Codebase directory not found: {}", config.codebase))?;

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create output directory: {}", config.output_dir))?;
    let output_dir = std::fs::canonicalize(&config.output_dir)
        .with_context(|| format!("Failed to resolve output directory: {}", config.output_dir))?;

    // Working directories live next to the output directory, one per agent.
    let agents_root = output_dir
        .parent()
        .unwrap_or(&output_dir)
        .join("agents");
    std::fs::create_dir_all(&agents_root)
        .with_context(|| format!("Failed to create {}", agents_root.display()))?;

    let parallel = config.settings.parallel;
    let mode = if parallel {
        Mode::Parallel {
            concurrency: config.settings.concurrency,
        }
    } else {
        Mode::Sequential
    };

    println!("🚀 Running {} agent(s) against {}", agents.len(), codebase.display());
    println!("   Mode: {}", describe_mode(mode, agents.len()));
    println!("   Timeout: {}s per step", config.settings.timeout);
    println!("   Results: {}\n", output_dir.display());

    if args.dry_run {
        return handle_dry_run(&agents, &agents_root, &output_dir, &codebase);
    }

    let ctx = RunContext {
        agents_root,
        output_dir: output_dir.clone(),
        codebase: codebase.clone(),
        timeout: Duration::from_secs(config.settings.timeout),
        show_progress: !parallel && !args.quiet,
    };

    let reports = orchestrator::run_fleet(agents, ctx, mode).await;

    // Aggregate and persist the summary
    let summary = RunSummary::from_reports(&reports);
    let fleet_report = FleetReport {
        generated_at: Utc::now(),
        codebase,
        parallel,
        duration_seconds: start_time.elapsed().as_secs_f64(),
        summary: summary.clone(),
        agents: reports,
    };

    let summary_path = report::write_json_summary(&fleet_report, &output_dir)?;

    println!("\n{}", report::render_summary(&fleet_report));
    println!(
        "✅ All agents processed. Summary saved to: {}",
        summary_path.display()
    );

    if summary.all_collected() {
        Ok(0)
    } else {
        Ok(2)
    }
}

/// Apply the --only filter, rejecting names that match no configured agent.
fn select_agents(config: &Config, args: &Args) -> Result<Vec<AgentSpec>> {
    let Some(ref only) = args.only else {
        return Ok(config.agents.clone());
    };

    for name in only {
        if !config.agents.iter().any(|agent| &agent.name == name) {
            bail!("--only names unknown agent '{}'", name);
        }
    }

    Ok(config
        .agents
        .iter()
        .filter(|agent| only.contains(&agent.name))
        .cloned()
        .collect())
}

/// Handle --dry-run: print the resolved plan and exit.
fn handle_dry_run(
    agents: &[AgentSpec],
    agents_root: &Path,
    output_dir: &Path,
    codebase: &PathBuf,
) -> Result<i32> {
    println!("🔍 Dry run: resolved plan (nothing will be fetched or executed)\n");

    for agent in agents {
        println!("   📦 {}", agent.name);
        println!("      repository: {} (branch {})", agent.repository, agent.branch);
        println!("      workdir:    {}", agents_root.join(&agent.name).display());
        println!("      install:    {}", agent.install_command);
        println!(
            "      run:        {} {}",
            agent.run_command,
            exec::quote(codebase)
        );
        println!(
            "      collect:    {} -> {}\n",
            agent.output_file,
            output_dir
                .join(format!("{}_output.json", agent.name))
                .display()
        );
    }

    println!("✅ Dry run complete. No agents were executed.");
    Ok(0)
}

/// Human rendering of the orchestration mode.
fn describe_mode(mode: Mode, agent_count: usize) -> String {
    match mode {
        Mode::Sequential => "sequential".to_string(),
        Mode::Parallel { concurrency } => {
            let cap = concurrency.unwrap_or(agent_count).max(1);
            format!("parallel ({} worker(s))", cap)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_agents(names: &[&str]) -> Config {
        let mut config = Config::default();
        for name in names {
            config.agents.push(AgentSpec {
                name: name.to_string(),
                repository: "https://github.com/acme/agent.git".to_string(),
                branch: "main".to_string(),
                install_command: "true".to_string(),
                run_command: "./analyze".to_string(),
                output_file: "report.json".to_string(),
            });
        }
        config
    }

    fn args_with_only(only: Option<Vec<String>>) -> Args {
        Args {
            config: PathBuf::from("agents.toml"),
            codebase: None,
            output_dir: None,
            timeout: None,
            parallel: false,
            sequential: false,
            jobs: None,
            only,
            verbose: false,
            quiet: false,
            dry_run: false,
            init_config: false,
        }
    }

    #[test]
    fn test_select_agents_without_filter() {
        let config = config_with_agents(&["a", "b"]);
        let selected = select_agents(&config, &args_with_only(None)).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_select_agents_with_filter() {
        let config = config_with_agents(&["a", "b", "c"]);
        let args = args_with_only(Some(vec!["c".to_string(), "a".to_string()]));
        let selected = select_agents(&config, &args).unwrap();

        // Configuration order is preserved, not filter order.
        let names: Vec<&str> = selected.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_select_agents_unknown_name() {
        let config = config_with_agents(&["a"]);
        let args = args_with_only(Some(vec!["ghost".to_string()]));
        assert!(select_agents(&config, &args).is_err());
    }

    #[test]
    fn test_describe_mode() {
        assert_eq!(describe_mode(Mode::Sequential, 3), "sequential");
        assert_eq!(
            describe_mode(Mode::Parallel { concurrency: None }, 3),
            "parallel (3 worker(s))"
        );
        assert_eq!(
            describe_mode(
                Mode::Parallel {
                    concurrency: Some(2)
                },
                3
            ),
            "parallel (2 worker(s))"
        );
    }
}
