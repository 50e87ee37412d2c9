//! Per-agent task pipeline.
//!
//! Drives one agent through fetch → install → run → collect with a uniform
//! per-step timeout. Every failure is contained: the pipeline always
//! returns an [`AgentReport`], never an error, so the orchestrator can fan
//! out many agents without one aborting the batch.

use crate::config::AgentSpec;
use crate::exec::{self, CommandOutput, ExecError};
use crate::models::{AgentReport, PipelineStage, TaskOutcome};
use crate::repo::{self, SyncError, SyncSpec};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Shared read-only context for every pipeline in a fleet run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Directory holding one persistent working directory per agent.
    pub agents_root: PathBuf,
    /// Absolute directory collected artifacts are copied into.
    pub output_dir: PathBuf,
    /// Absolute path of the codebase under analysis.
    pub codebase: PathBuf,
    /// Uniform time budget for each of fetch, install, and run.
    pub timeout: Duration,
    /// Render a transfer progress bar during fetch.
    pub show_progress: bool,
}

impl RunContext {
    /// Working directory of one agent.
    pub fn workdir(&self, agent: &AgentSpec) -> PathBuf {
        self.agents_root.join(&agent.name)
    }

    /// Destination path of one agent's collected artifact.
    pub fn artifact_path(&self, agent: &AgentSpec) -> PathBuf {
        self.output_dir.join(format!("{}_output.json", agent.name))
    }
}

/// Drive one agent through the full pipeline and report its outcome.
///
/// Prints one status line per terminal event; the structured outcome is
/// returned to the orchestrator for aggregation.
pub async fn run_agent(agent: AgentSpec, ctx: RunContext) -> AgentReport {
    let started = Instant::now();
    info!("starting pipeline for {}", agent.name);

    let outcome = drive(&agent, &ctx).await;
    let duration_seconds = started.elapsed().as_secs_f64();

    println!("{} {}: {}", outcome.emoji(), agent.name, outcome);

    AgentReport {
        name: agent.name,
        outcome,
        duration_seconds,
    }
}

/// The pipeline proper. Every error path is converted into a
/// [`TaskOutcome`] so nothing escapes to the caller.
async fn drive(agent: &AgentSpec, ctx: &RunContext) -> TaskOutcome {
    let workdir = ctx.workdir(agent);

    // Step 1: materialize the working directory.
    if let Err(e) = tokio::fs::create_dir_all(&workdir).await {
        return TaskOutcome::Failed {
            stage: PipelineStage::Fetch,
            reason: format!("cannot create {}: {}", workdir.display(), e),
        };
    }

    // Step 2: clone or update the agent's repository. git2 is a blocking
    // API, so the sync runs on the blocking pool; its deadline is enforced
    // from inside the transfer callback.
    let sync_spec = SyncSpec {
        url: agent.repository.clone(),
        branch: agent.branch.clone(),
        dest: workdir.clone(),
        timeout: ctx.timeout,
        depth: Some(1),
        show_progress: ctx.show_progress,
    };
    match tokio::task::spawn_blocking(move || repo::clone_or_update(&sync_spec)).await {
        Ok(Ok(kind)) => debug!("{}: {:?}", agent.name, kind),
        Ok(Err(SyncError::DeadlineExceeded(_))) => {
            return TaskOutcome::TimedOut {
                stage: PipelineStage::Fetch,
            }
        }
        Ok(Err(e)) => {
            return TaskOutcome::Failed {
                stage: PipelineStage::Fetch,
                reason: e.to_string(),
            }
        }
        Err(e) => {
            return TaskOutcome::Failed {
                stage: PipelineStage::Fetch,
                reason: format!("sync task aborted: {}", e),
            }
        }
    }

    // Step 3: install dependencies inside the working directory.
    let install = exec::run_shell(&agent.install_command, &workdir, ctx.timeout).await;
    if let Some(outcome) = step_failure(PipelineStage::Install, install) {
        return outcome;
    }

    // Step 4: run the analysis with the codebase appended as the final
    // argument.
    let run_command = format!("{} {}", agent.run_command, exec::quote(&ctx.codebase));
    let run = exec::run_shell(&run_command, &workdir, ctx.timeout).await;
    if let Ok(ref output) = run {
        if !output.stdout.trim().is_empty() {
            debug!("{} stdout: {}", agent.name, output.stdout.trim());
        }
        if !output.stderr.trim().is_empty() {
            debug!("{} stderr: {}", agent.name, output.stderr.trim());
        }
    }
    if let Some(outcome) = step_failure(PipelineStage::Run, run) {
        return outcome;
    }

    // Step 5: collect the declared output file.
    collect(agent, ctx)
}

/// Map a failed command into the outcome that terminates the pipeline.
fn step_failure(
    stage: PipelineStage,
    result: Result<CommandOutput, ExecError>,
) -> Option<TaskOutcome> {
    match result {
        Ok(_) => None,
        Err(ExecError::TimedOut { .. }) => Some(TaskOutcome::TimedOut { stage }),
        Err(e) => Some(TaskOutcome::Failed {
            stage,
            reason: e.to_string(),
        }),
    }
}

/// Copy the declared output file into the results directory.
fn collect(agent: &AgentSpec, ctx: &RunContext) -> TaskOutcome {
    let source = ctx.workdir(agent).join(&agent.output_file);
    if !source.exists() {
        return TaskOutcome::OutputMissing;
    }

    let artifact = ctx.artifact_path(agent);
    match std::fs::copy(&source, &artifact) {
        Ok(_) => TaskOutcome::Collected { artifact },
        Err(e) => TaskOutcome::Failed {
            stage: PipelineStage::Collect,
            reason: format!("cannot copy {}: {}", source.display(), e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{commit_file, init_agent_repo};
    use tempfile::TempDir;

    /// Script that records the codebase argument it was handed.
    const RECORDING_SCRIPT: &str = "printf '{\"analyzed\":\"%s\"}' \"$1\" > report.json\n";

    fn fixture_ctx(root: &TempDir, timeout: Duration) -> RunContext {
        let output_dir = root.path().join("results");
        let codebase = root.path().join("codebase");
        std::fs::create_dir_all(&output_dir).unwrap();
        std::fs::create_dir_all(&codebase).unwrap();

        RunContext {
            agents_root: root.path().join("agents"),
            output_dir,
            codebase,
            timeout,
            show_progress: false,
        }
    }

    fn fixture_agent(name: &str, repo_dir: &std::path::Path) -> AgentSpec {
        AgentSpec {
            name: name.to_string(),
            repository: repo_dir.to_string_lossy().into_owned(),
            branch: "main".to_string(),
            install_command: "true".to_string(),
            run_command: "sh analyze.sh".to_string(),
            output_file: "report.json".to_string(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipeline_collects_output() {
        let root = TempDir::new().unwrap();
        let repo_dir = root.path().join("source");
        init_agent_repo(&repo_dir, RECORDING_SCRIPT);

        let ctx = fixture_ctx(&root, Duration::from_secs(30));
        let agent = fixture_agent("recorder", &repo_dir);

        let report = run_agent(agent.clone(), ctx.clone()).await;
        assert!(report.outcome.is_success(), "outcome: {}", report.outcome);

        let artifact = ctx.artifact_path(&agent);
        let content = std::fs::read_to_string(&artifact).unwrap();
        assert!(content.contains(&*ctx.codebase.to_string_lossy()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_failure_is_contained() {
        let root = TempDir::new().unwrap();
        let repo_dir = root.path().join("source");
        init_agent_repo(&repo_dir, RECORDING_SCRIPT);

        let ctx = fixture_ctx(&root, Duration::from_secs(30));
        let mut agent = fixture_agent("broken-install", &repo_dir);
        agent.install_command = "echo dependency hell >&2; exit 1".to_string();

        let report = run_agent(agent.clone(), ctx.clone()).await;
        match report.outcome {
            TaskOutcome::Failed { stage, ref reason } => {
                assert_eq!(stage, PipelineStage::Install);
                assert!(reason.contains("dependency hell"), "reason: {}", reason);
            }
            ref other => panic!("expected install failure, got {}", other),
        }
        assert!(!ctx.artifact_path(&agent).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_output_is_reported() {
        let root = TempDir::new().unwrap();
        let repo_dir = root.path().join("source");
        init_agent_repo(&repo_dir, "true\n");

        let ctx = fixture_ctx(&root, Duration::from_secs(30));
        let agent = fixture_agent("silent", &repo_dir);

        let report = run_agent(agent.clone(), ctx.clone()).await;
        assert!(matches!(report.outcome, TaskOutcome::OutputMissing));
        assert!(!ctx.artifact_path(&agent).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_timeout_aborts_pipeline() {
        let root = TempDir::new().unwrap();
        let repo_dir = root.path().join("source");
        init_agent_repo(&repo_dir, "sleep 60\n");

        let ctx = fixture_ctx(&root, Duration::from_secs(2));
        let agent = fixture_agent("sleeper", &repo_dir);

        let started = Instant::now();
        let report = run_agent(agent.clone(), ctx.clone()).await;

        assert!(matches!(
            report.outcome,
            TaskOutcome::TimedOut {
                stage: PipelineStage::Run
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(15));
        assert!(!ctx.artifact_path(&agent).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_second_run_updates_in_place() {
        let root = TempDir::new().unwrap();
        let repo_dir = root.path().join("source");
        let repo = init_agent_repo(&repo_dir, "printf '{\"v\":1}' > report.json\n");

        let ctx = fixture_ctx(&root, Duration::from_secs(30));
        let agent = fixture_agent("versioned", &repo_dir);

        let first = run_agent(agent.clone(), ctx.clone()).await;
        assert!(first.outcome.is_success());
        assert!(ctx.workdir(&agent).join(".git").exists());

        commit_file(&repo, "analyze.sh", "printf '{\"v\":2}' > report.json\n", "v2");

        let second = run_agent(agent.clone(), ctx.clone()).await;
        assert!(second.outcome.is_success());

        let content = std::fs::read_to_string(ctx.artifact_path(&agent)).unwrap();
        assert_eq!(content, "{\"v\":2}");
    }
}
