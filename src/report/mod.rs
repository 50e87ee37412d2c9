//! Run summary reporting.
//!
//! Renders the per-agent outcomes for the console and writes the
//! machine-readable summary artifact into the results directory.

pub mod generator;

pub use generator::{render_summary, write_json_summary};
