//! Data models for fleet runs.
//!
//! This module contains the core data structures shared between the task
//! runner, the orchestrator, and the run summary: pipeline stages,
//! per-agent outcomes, and aggregate statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stage of the per-agent task pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    /// Clone or update the agent's repository.
    Fetch,
    /// Execute the agent's install command.
    Install,
    /// Execute the agent's analysis command.
    Run,
    /// Copy the declared output file into the results directory.
    Collect,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Fetch => write!(f, "fetch"),
            PipelineStage::Install => write!(f, "install"),
            PipelineStage::Run => write!(f, "run"),
            PipelineStage::Collect => write!(f, "collect"),
        }
    }
}

/// Terminal outcome of one agent's pipeline.
///
/// Every failure path inside the task runner is folded into one of these
/// variants; the runner never propagates an error to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The declared output file was copied into the results directory.
    Collected {
        /// Absolute path of the collected artifact.
        artifact: PathBuf,
    },
    /// A step exceeded the configured timeout and was aborted.
    TimedOut { stage: PipelineStage },
    /// A step failed: nonzero exit, git error, or I/O error.
    Failed { stage: PipelineStage, reason: String },
    /// The run command succeeded but the declared output file was absent.
    OutputMissing,
}

impl TaskOutcome {
    /// Whether this outcome produced an artifact.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Collected { .. })
    }

    /// Returns an emoji representation of the outcome.
    pub fn emoji(&self) -> &'static str {
        match self {
            TaskOutcome::Collected { .. } => "✅",
            TaskOutcome::TimedOut { .. } => "⏱️",
            TaskOutcome::Failed { .. } => "❌",
            TaskOutcome::OutputMissing => "⚠️",
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Collected { artifact } => {
                write!(f, "collected {}", artifact.display())
            }
            TaskOutcome::TimedOut { stage } => write!(f, "timed out during {}", stage),
            TaskOutcome::Failed { stage, reason } => write!(f, "{} failed: {}", stage, reason),
            TaskOutcome::OutputMissing => write!(f, "run succeeded but no output file was produced"),
        }
    }
}

/// Result of driving one agent through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    /// Agent name from the configuration.
    pub name: String,
    /// Terminal outcome of the pipeline.
    pub outcome: TaskOutcome,
    /// Wall-clock duration of the pipeline in seconds.
    pub duration_seconds: f64,
}

/// Aggregate statistics over a fleet run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Total number of agents attempted.
    pub total: usize,
    /// Agents whose output was collected.
    pub collected: usize,
    /// Agents aborted by a step timeout.
    pub timed_out: usize,
    /// Agents with a failed step.
    pub failed: usize,
    /// Agents whose run succeeded without producing the declared file.
    pub output_missing: usize,
}

impl RunSummary {
    /// Creates a summary from a list of agent reports.
    pub fn from_reports(reports: &[AgentReport]) -> Self {
        let mut summary = Self {
            total: reports.len(),
            ..Self::default()
        };

        for report in reports {
            match report.outcome {
                TaskOutcome::Collected { .. } => summary.collected += 1,
                TaskOutcome::TimedOut { .. } => summary.timed_out += 1,
                TaskOutcome::Failed { .. } => summary.failed += 1,
                TaskOutcome::OutputMissing => summary.output_missing += 1,
            }
        }

        summary
    }

    /// Whether every attempted agent produced its artifact.
    pub fn all_collected(&self) -> bool {
        self.collected == self.total
    }
}

/// Complete record of a fleet run, serialized to `fleet_summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetReport {
    /// When the run finished.
    pub generated_at: DateTime<Utc>,
    /// Absolute path of the analyzed codebase.
    pub codebase: PathBuf,
    /// Whether the fleet ran in parallel mode.
    pub parallel: bool,
    /// Wall-clock duration of the whole run in seconds.
    pub duration_seconds: f64,
    /// Aggregate statistics.
    pub summary: RunSummary,
    /// Per-agent reports in configuration order.
    pub agents: Vec<AgentReport>,
}
