//! Git repository handling.
//!
//! Each agent keeps a persistent checkout under the fleet's `agents/`
//! directory; this module brings it up to date before every run.

pub mod sync;

pub use sync::{clone_or_update, SyncError, SyncKind, SyncSpec};
