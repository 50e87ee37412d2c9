//! Clone-or-update synchronization of agent repositories.
//!
//! The first run clones an agent's repository into its working directory;
//! subsequent runs fetch the configured branch and fast-forward the local
//! checkout in place. A deadline is enforced from the transfer progress
//! callback, which aborts the transfer once the time budget is spent.

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{FetchOptions, Progress, RemoteCallbacks, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// How the working directory was brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// Fresh clone into an empty working directory.
    Cloned,
    /// Existing checkout fetched and fast-forwarded.
    Updated,
}

/// Error from a clone-or-update operation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The transfer was aborted because the time budget was spent.
    #[error("transfer exceeded {}s", .0.as_secs())]
    DeadlineExceeded(Duration),

    /// The local branch can no longer fast-forward to the remote branch.
    #[error("cannot fast-forward {branch}: histories have diverged")]
    NonFastForward { branch: String },

    /// The working directory exists, is non-empty, and is not a checkout.
    #[error("working directory {0} exists but is not a git checkout")]
    NotARepository(PathBuf),

    #[error(transparent)]
    Git(#[from] git2::Error),
}

/// Parameters for one synchronization.
#[derive(Debug, Clone)]
pub struct SyncSpec {
    /// Repository URL (or local path for file-based remotes).
    pub url: String,
    /// Branch to fetch and check out.
    pub branch: String,
    /// Working directory holding the checkout.
    pub dest: PathBuf,
    /// Time budget for the transfer.
    pub timeout: Duration,
    /// Depth for shallow clone (None for full clone).
    pub depth: Option<i32>,
    /// Whether to render a transfer progress bar.
    pub show_progress: bool,
}

/// Bring the working directory up to date with the configured branch.
///
/// Blocking; callers on an async runtime should wrap this in
/// `spawn_blocking`.
pub fn clone_or_update(spec: &SyncSpec) -> Result<SyncKind, SyncError> {
    let deadline_hit = Arc::new(AtomicBool::new(false));

    let result = if spec.dest.join(".git").exists() {
        update(spec, &deadline_hit).map(|()| SyncKind::Updated)
    } else {
        clone(spec, &deadline_hit).map(|_| SyncKind::Cloned)
    };

    // A deadline abort surfaces from libgit2 as a generic callback error;
    // the flag tells the two cases apart.
    match result {
        Err(SyncError::Git(_)) if deadline_hit.load(Ordering::Relaxed) => {
            Err(SyncError::DeadlineExceeded(spec.timeout))
        }
        other => other,
    }
}

/// Fresh clone of the configured branch into the working directory.
fn clone(spec: &SyncSpec, deadline_hit: &Arc<AtomicBool>) -> Result<Repository, SyncError> {
    if spec.dest.exists() {
        let has_entries = std::fs::read_dir(&spec.dest)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if has_entries {
            return Err(SyncError::NotARepository(spec.dest.clone()));
        }
    }

    info!("cloning {} (branch {})", spec.url, spec.branch);

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options(spec, deadline_hit));
    builder.branch(&spec.branch);

    let repo = builder.clone(&spec.url, &spec.dest)?;
    debug!("cloned into {}", spec.dest.display());
    Ok(repo)
}

/// Fetch the configured branch and fast-forward the existing checkout.
fn update(spec: &SyncSpec, deadline_hit: &Arc<AtomicBool>) -> Result<(), SyncError> {
    info!("updating {} (branch {})", spec.dest.display(), spec.branch);

    let repo = Repository::open(&spec.dest)?;
    let mut remote = repo.find_remote("origin")?;
    remote.fetch(
        &[spec.branch.as_str()],
        Some(&mut fetch_options(spec, deadline_hit)),
        None,
    )?;

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let fetched = repo.reference_to_annotated_commit(&fetch_head)?;

    let (analysis, _) = repo.merge_analysis(&[&fetched])?;
    if analysis.is_up_to_date() {
        debug!("{} already up to date", spec.dest.display());
        return Ok(());
    }
    if !analysis.is_fast_forward() {
        return Err(SyncError::NonFastForward {
            branch: spec.branch.clone(),
        });
    }

    let refname = format!("refs/heads/{}", spec.branch);
    match repo.find_reference(&refname) {
        Ok(mut reference) => {
            reference.set_target(fetched.id(), "fast-forward")?;
        }
        Err(_) => {
            repo.reference(&refname, fetched.id(), true, "fast-forward")?;
        }
    }
    repo.set_head(&refname)?;

    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))?;

    debug!("fast-forwarded {} to {}", refname, fetched.id());
    Ok(())
}

/// Build fetch options with the deadline callback and optional progress bar.
fn fetch_options<'cb>(spec: &SyncSpec, deadline_hit: &Arc<AtomicBool>) -> FetchOptions<'cb> {
    let deadline = Instant::now() + spec.timeout;
    let flag = Arc::clone(deadline_hit);

    let progress_bar = if spec.show_progress {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |progress: Progress<'_>| {
        if let Some(ref pb) = progress_bar {
            pb.set_length(progress.total_objects() as u64);
            pb.set_position(progress.received_objects() as u64);
        }
        if Instant::now() >= deadline {
            flag.store(true, Ordering::Relaxed);
            return false;
        }
        true
    });

    let mut opts = FetchOptions::new();
    opts.remote_callbacks(callbacks);

    // Plain filesystem paths use the local transport, which cannot
    // negotiate a shallow fetch.
    if let Some(depth) = spec.depth {
        if supports_shallow(&spec.url) {
            opts.depth(depth);
        }
    }

    opts
}

/// Whether the URL goes through a transport that supports shallow fetches.
fn supports_shallow(url: &str) -> bool {
    (url.contains("://") && !url.starts_with("file://")) || url.starts_with("git@")
}
