//! Validation, promotion and reload of a staged file.
//!
//! # State machine
//! ```text
//! staged ──check_cmd ok──▶ promoted ──reload_cmd ok──▶ Committed
//!    │                        │
//!    │ check_cmd fails        └──reload_cmd fails──▶ ReloadFailed (file stays)
//!    ▼
//! ValidationFailed (staging removed, dest untouched)
//! ```

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command timed out after {timeout:?}: '{command}'")]
    Timeout { command: String, timeout: Duration },

    #[error("non-zero exit ({status}) from '{command}': {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Outcome of [`commit`].
#[derive(Debug)]
pub enum CommitOutcome {
    Committed,
    ValidationFailed(CommandError),
    PromotionFailed(std::io::Error),
    /// The file was promoted but the reload command failed.
    ReloadFailed(CommandError),
}

/// Replace the staging placeholders in a validation command.
pub fn expand_command(command: &str, staging: &Path) -> String {
    let path = staging.display().to_string();
    command.replace("{{.src}}", &path).replace("{{src}}", &path)
}

fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Run a shell command, killing it when `timeout` elapses.
pub async fn run_command(command: &str, timeout: Duration) -> Result<Vec<u8>, CommandError> {
    tracing::info!(command = %command, "Running command");

    let mut cmd = shell(command);
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(CommandError::Spawn {
                command: command.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(CommandError::Timeout {
                command: command.to_string(),
                timeout,
            })
        }
    };

    if !output.status.success() {
        return Err(CommandError::Failed {
            command: command.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    tracing::info!(command = %command, "Command finished");
    Ok(output.stdout)
}

/// Validate the staged file, promote it, then reload.
pub async fn commit(
    staging: &Path,
    dest: &Path,
    check_cmd: Option<&str>,
    reload_cmd: Option<&str>,
    timeout: Duration,
) -> CommitOutcome {
    if let Some(check) = check_cmd {
        if let Err(e) = run_command(&expand_command(check, staging), timeout).await {
            if staging != dest {
                if let Err(rm) = tokio::fs::remove_file(staging).await {
                    tracing::warn!(path = %staging.display(), error = %rm, "Failed to remove staging file");
                }
            }
            return CommitOutcome::ValidationFailed(e);
        }
    }

    if staging != dest {
        if let Err(e) = tokio::fs::rename(staging, dest).await {
            return CommitOutcome::PromotionFailed(e);
        }
    }
    tracing::info!(dest = %dest.display(), "Configuration promoted");

    if let Some(reload) = reload_cmd {
        if let Err(e) = run_command(reload, timeout).await {
            return CommitOutcome::ReloadFailed(e);
        }
    }

    CommitOutcome::Committed
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_expand_command() {
        let staging = Path::new("/tmp/app.conf.tmp");
        assert_eq!(expand_command("nginx -t -c {{.src}}", staging), "nginx -t -c /tmp/app.conf.tmp");
        assert_eq!(expand_command("check {{src}}", staging), "check /tmp/app.conf.tmp");
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let err = run_command("sleep 5", Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_run_command_failure_captures_stderr() {
        let err = run_command("echo bad >&2; exit 3", Duration::from_secs(5)).await.unwrap_err();
        match err {
            CommandError::Failed { stderr, .. } => assert_eq!(stderr, "bad"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failed_validation_keeps_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("app.conf");
        let staging = dir.path().join("app.conf.tmp");
        let marker = dir.path().join("reloaded");
        std::fs::write(&dest, b"old").unwrap();
        std::fs::write(&staging, b"new").unwrap();

        let reload = format!("touch {}", marker.display());
        let outcome = commit(&staging, &dest, Some("false"), Some(&reload), Duration::from_secs(5)).await;

        assert!(matches!(outcome, CommitOutcome::ValidationFailed(_)));
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
        assert!(!staging.exists());
        assert!(!marker.exists(), "reload must not run");
    }

    #[tokio::test]
    async fn test_successful_commit_promotes_then_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("app.conf");
        let staging = dir.path().join("app.conf.tmp");
        let marker = dir.path().join("reloaded");
        std::fs::write(&staging, b"new").unwrap();

        let check = "grep -q new {{.src}}";
        let reload = format!("test -f {} && touch {}", dest.display(), marker.display());
        let outcome = commit(&staging, &dest, Some(check), Some(&reload), Duration::from_secs(5)).await;

        assert!(matches!(outcome, CommitOutcome::Committed));
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_promoted_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("app.conf");
        let staging = dir.path().join("app.conf.tmp");
        std::fs::write(&staging, b"new").unwrap();

        let outcome = commit(&staging, &dest, None, Some("exit 1"), Duration::from_secs(5)).await;
        assert!(matches!(outcome, CommitOutcome::ReloadFailed(_)));
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }
}
