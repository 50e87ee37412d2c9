//! Shared test fixtures: local git repositories built programmatically.

use git2::{Repository, RepositoryInitOptions, Signature};
use std::path::Path;

/// Initialize an empty repository whose default branch is `main`.
pub fn init_repo(dir: &Path) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    Repository::init_opts(dir, &opts).expect("init fixture repository")
}

/// Write `content` to `rel` inside the repository and commit it on HEAD.
pub fn commit_file(repo: &Repository, rel: &str, content: &str, message: &str) {
    let workdir = repo.workdir().expect("fixture repository has a workdir");
    std::fs::write(workdir.join(rel), content).expect("write fixture file");

    let mut index = repo.index().expect("open index");
    index.add_path(Path::new(rel)).expect("stage fixture file");
    index.write().expect("write index");

    let tree_id = index.write_tree().expect("write tree");
    let tree = repo.find_tree(tree_id).expect("find tree");
    let sig = Signature::now("fleet-test", "fleet-test@example.com").expect("signature");

    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .expect("commit fixture file");
}

/// Create an agent repository whose analysis script is `script` (run as
/// `sh analyze.sh <codebase>`).
pub fn init_agent_repo(dir: &Path, script: &str) -> Repository {
    let repo = init_repo(dir);
    commit_file(&repo, "analyze.sh", script, "add analysis script");
    repo
}
