//! run_command - execute a shell command in the working tree

use std::process::Stdio;

use tracing::debug;

use crate::protocol::ActionParams;
use crate::tools::{ToolContext, ToolError};

/// Kills a command's whole process group when dropped while armed
///
/// `sh -c` forks compound commands into grandchildren that `kill_on_drop`
/// never reaches. The child leads its own group, so the group id is its pid.
#[cfg(unix)]
struct ProcessGroupGuard {
    pgid: Option<i32>,
}

#[cfg(unix)]
impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|p| i32::try_from(p).ok()),
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

#[cfg(unix)]
impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pgid) = self.pgid.take() {
            debug!(pgid, "ProcessGroupGuard::drop: killing process group");
            if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                debug!(pgid, %e, "ProcessGroupGuard::drop: killpg failed");
            }
        }
    }
}

/// Run `sh -c <command>` in the working tree
///
/// The shell leads a fresh process group. If the executor drops this future
/// on cancellation, the guard kills the whole group, so nothing the command
/// forked keeps running against the working tree.
pub async fn run_command(params: &ActionParams, ctx: &ToolContext) -> Result<String, ToolError> {
    debug!(command = ?params.command, "run_command: called");
    let command = match params.command.as_deref() {
        Some(c) if !c.trim().is_empty() => c,
        _ => {
            debug!("run_command: missing command parameter");
            return Err(ToolError::MissingParam { param: "command" });
        }
    };

    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(&ctx.work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(ToolError::Spawn)?;
    #[cfg(unix)]
    let mut guard = ProcessGroupGuard::new(child.id());

    let output = child.wait_with_output().await.map_err(ToolError::Spawn)?;
    #[cfg(unix)]
    guard.disarm();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(stdout_len = stdout.len(), stderr_len = stderr.len(), status = ?output.status, "run_command: completed");

    let combined = if stdout.is_empty() {
        stderr.to_string()
    } else if stderr.is_empty() {
        stdout.to_string()
    } else {
        format!("{}\n\nSTDERR:\n{}", stdout, stderr)
    };

    if output.status.success() {
        Ok(combined)
    } else {
        Err(ToolError::CommandFailed {
            code: output.status.code().unwrap_or(-1),
            output: combined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    fn params(command: &str) -> ActionParams {
        ActionParams {
            command: Some(command.to_string()),
            ..Default::default()
        }
    }

    fn ctx(dir: &std::path::Path) -> ToolContext {
        ToolContext::new(dir.to_path_buf(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_run_command_basic() {
        let temp = tempdir().unwrap();
        let out = run_command(&params("echo hello"), &ctx(temp.path())).await.unwrap();
        assert!(out.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_command_runs_in_work_dir() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "").unwrap();

        let out = run_command(&params("ls"), &ctx(temp.path())).await.unwrap();
        assert!(out.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_run_command_combines_stdout_and_stderr() {
        let temp = tempdir().unwrap();
        let out = run_command(&params("echo out; echo err >&2"), &ctx(temp.path()))
            .await
            .unwrap();

        assert!(out.contains("out"));
        assert!(out.contains("STDERR:\nerr"));
    }

    #[tokio::test]
    async fn test_run_command_failure_reports_process_text() {
        let temp = tempdir().unwrap();
        let err = run_command(&params("echo boom >&2; exit 3"), &ctx(temp.path()))
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("Exit code: 3"));
        assert!(msg.contains("boom"));
        assert!(!msg.to_lowercase().contains("cancel"));
    }

    #[tokio::test]
    async fn test_run_command_missing_command() {
        let temp = tempdir().unwrap();
        let err = run_command(&ActionParams::default(), &ctx(temp.path())).await.unwrap_err();
        assert!(err.to_string().contains("command is required"));
    }
}
