//! Fleet orchestration.
//!
//! Dispatches every configured agent through the task pipeline, either
//! sequentially in configuration order or through a bounded worker pool.
//! Outcomes are aggregated as structured reports; a failing agent never
//! affects another agent's execution.

use crate::config::AgentSpec;
use crate::models::AgentReport;
use crate::runner::{self, RunContext};
use futures::stream::{self, StreamExt};
use tracing::info;

/// Orchestration mode for a fleet run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One agent at a time, in configuration order.
    Sequential,
    /// Bounded worker pool; `concurrency` of `None` sizes the pool to the
    /// agent count.
    Parallel { concurrency: Option<usize> },
}

/// Drive every agent through the pipeline exactly once.
///
/// Reports are returned in configuration order regardless of completion
/// order, so downstream output is deterministic.
pub async fn run_fleet(agents: Vec<AgentSpec>, ctx: RunContext, mode: Mode) -> Vec<AgentReport> {
    match mode {
        Mode::Sequential => {
            let mut reports = Vec::with_capacity(agents.len());
            for agent in agents {
                reports.push(runner::run_agent(agent, ctx.clone()).await);
            }
            reports
        }
        Mode::Parallel { concurrency } => {
            let cap = concurrency.unwrap_or(agents.len()).max(1);
            info!("dispatching {} agent(s) across {} worker(s)", agents.len(), cap);

            let order: Vec<String> = agents.iter().map(|a| a.name.clone()).collect();
            let mut reports: Vec<AgentReport> = stream::iter(agents)
                .map(|agent| runner::run_agent(agent, ctx.clone()))
                .buffer_unordered(cap)
                .collect()
                .await;

            reports.sort_by_key(|report| {
                order
                    .iter()
                    .position(|name| name == &report.name)
                    .unwrap_or(usize::MAX)
            });
            reports
        }
    }
}
