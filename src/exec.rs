//! Shell command execution with enforced timeouts.
//!
//! Every invocation takes its working directory as an explicit per-call
//! parameter and applies it with [`tokio::process::Command::current_dir`];
//! the process-wide current directory is never read or mutated, so
//! concurrently running pipelines cannot race on it.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Error from a single shell command invocation.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The shell itself could not be spawned.
    #[error("failed to spawn shell: {0}")]
    Spawn(#[source] std::io::Error),

    /// The command ran but exited with a non-zero status.
    #[error("exited with {status}: {stderr_tail}")]
    NonZeroExit {
        status: std::process::ExitStatus,
        /// Last stderr line, trimmed for one-line log output.
        stderr_tail: String,
    },

    /// The command exceeded its time budget and was killed.
    #[error("timed out after {}s", .limit.as_secs())]
    TimedOut { limit: Duration },

    /// Waiting on the child process failed.
    #[error("failed waiting for command: {0}")]
    Wait(#[source] std::io::Error),
}

/// Captured output of a successfully completed command.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` through the system shell with `workdir` as its working
/// directory, killing it if it outlives `timeout`.
///
/// On timeout the child is killed explicitly before returning; relying on
/// dropping the future alone does not terminate the OS process on all
/// platforms.
pub async fn run_shell(
    command: &str,
    workdir: &Path,
    timeout: Duration,
) -> Result<CommandOutput, ExecError> {
    debug!("running `{}` in {}", command, workdir.display());

    let mut child = shell_command(command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(ExecError::Spawn)?;

    let mut stdout_handle = child.stdout.take();
    let mut stderr_handle = child.stderr.take();

    tokio::select! {
        result = async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stdout_handle {
                        let _ = h.read_to_end(&mut buf).await;
                    }
                    buf
                },
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stderr_handle {
                        let _ = h.read_to_end(&mut buf).await;
                    }
                    buf
                },
            );

            let status = status.map_err(ExecError::Wait)?;
            let stdout = String::from_utf8_lossy(&stdout).into_owned();
            let stderr = String::from_utf8_lossy(&stderr).into_owned();

            if status.success() {
                Ok(CommandOutput { stdout, stderr })
            } else {
                Err(ExecError::NonZeroExit {
                    status,
                    stderr_tail: stderr_tail(&stderr),
                })
            }
        } => result,
        () = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            Err(ExecError::TimedOut { limit: timeout })
        }
    }
}

/// Build the platform shell invocation for a command string.
fn shell_command(command: &str) -> tokio::process::Command {
    #[cfg(windows)]
    {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Single-quote a path for appending as a shell argument.
pub fn quote(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// Last non-empty stderr line, truncated for one-line log output.
fn stderr_tail(stderr: &str) -> String {
    let tail = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim();

    if tail.is_empty() {
        return "(no stderr)".to_string();
    }

    const MAX: usize = 200;
    if tail.len() > MAX {
        let cut = tail
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}…", &tail[..cut])
    } else {
        tail.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Instant;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_stdout() {
        let dir = TempDir::new().unwrap();
        let output = run_shell("echo hello", dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit() {
        let dir = TempDir::new().unwrap();
        let err = run_shell("echo oops >&2; exit 3", dir.path(), Duration::from_secs(10))
            .await
            .unwrap_err();

        match err {
            ExecError::NonZeroExit { status, stderr_tail } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr_tail, "oops");
            }
            other => panic!("expected NonZeroExit, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_command() {
        let dir = TempDir::new().unwrap();
        let started = Instant::now();
        let err = run_shell("sleep 30", dir.path(), Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_given_workdir() {
        let dir = TempDir::new().unwrap();
        run_shell("echo data > marker.txt", dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(dir.path().join("marker.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_concurrent_commands_keep_their_workdirs() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();

        let (out_a, out_b) = tokio::join!(
            run_shell("sleep 0.1; pwd", dir_a.path(), Duration::from_secs(10)),
            run_shell("pwd; sleep 0.1", dir_b.path(), Duration::from_secs(10)),
        );

        let seen_a = std::fs::canonicalize(out_a.unwrap().stdout.trim()).unwrap();
        let seen_b = std::fs::canonicalize(out_b.unwrap().stdout.trim()).unwrap();
        assert_eq!(seen_a, std::fs::canonicalize(dir_a.path()).unwrap());
        assert_eq!(seen_b, std::fs::canonicalize(dir_b.path()).unwrap());
        assert_ne!(seen_a, seen_b);
    }

    #[test]
    fn test_quote_plain_path() {
        assert_eq!(quote(&PathBuf::from("/tmp/codebase")), "'/tmp/codebase'");
    }

    #[test]
    fn test_quote_escapes_quotes_and_spaces() {
        let quoted = quote(&PathBuf::from("/tmp/it's here"));
        assert_eq!(quoted, r"'/tmp/it'\''s here'");
    }

    #[test]
    fn test_stderr_tail_picks_last_line() {
        assert_eq!(stderr_tail("first\nsecond\n\n"), "second");
        assert_eq!(stderr_tail(""), "(no stderr)");
    }
}
