//! Fleet summary generation.

use crate::models::FleetReport;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// File name of the machine-readable summary artifact.
pub const SUMMARY_FILE: &str = "fleet_summary.json";

/// Render the run summary as a console block.
pub fn render_summary(report: &FleetReport) -> String {
    let mut output = String::new();

    output.push_str("📊 Fleet Summary:\n");
    output.push_str(&format!(
        "   Agents: {} | ✅ Collected: {} | ⏱️ Timed out: {} | ❌ Failed: {} | ⚠️ Missing output: {}\n",
        report.summary.total,
        report.summary.collected,
        report.summary.timed_out,
        report.summary.failed,
        report.summary.output_missing,
    ));
    output.push_str(&format!(
        "   Duration: {:.1}s\n\n",
        report.duration_seconds
    ));

    for agent in &report.agents {
        output.push_str(&format!(
            "   {} {} ({:.1}s): {}\n",
            agent.outcome.emoji(),
            agent.name,
            agent.duration_seconds,
            agent.outcome,
        ));
    }

    output
}

/// Serialize the full report as pretty-printed JSON.
pub fn generate_json(report: &FleetReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize fleet summary")
}

/// Write the summary artifact into the results directory.
pub fn write_json_summary(report: &FleetReport, output_dir: &Path) -> Result<PathBuf> {
    let path = output_dir.join(SUMMARY_FILE);
    let json = generate_json(report)?;

    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write summary to {}", path.display()))?;

    Ok(path)
}
