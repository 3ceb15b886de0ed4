//! Process-exec wrapper for external binaries.
//!
//! Commands observe the shared cancellation token: cancellation kills
//! the child and surfaces as [`SidecarError::Canceled`].

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SidecarError};

/// Controls how [`run`] and [`run_capture`] execute a command.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Extra environment entries layered over the inherited environment
    pub envs: Vec<(String, String)>,
    /// Working directory; inherited when unset
    pub dir: Option<PathBuf>,
}

/// Runs a command to completion, forwarding its standard streams.
pub async fn run<I, S>(
    cancel: &CancellationToken,
    program: &str,
    args: I,
    opts: &RunOptions,
) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = build_command(program, args, opts)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, &e))?;

    let waited = tokio::select! {
        () = cancel.cancelled() => None,
        status = child.wait() => Some(status),
    };
    let Some(status) = waited else {
        let _ = child.kill().await;
        return Err(SidecarError::Canceled);
    };

    let status = status.map_err(|e| SidecarError::CommandFailed {
        command: program.to_string(),
        message: format!("wait: {e}"),
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(SidecarError::CommandFailed {
            command: program.to_string(),
            message: format!("exited with {status}"),
        })
    }
}

/// Runs a command to completion, returning captured stdout.
///
/// On a non-zero exit the captured stderr is folded into the error.
pub async fn run_capture<I, S>(
    cancel: &CancellationToken,
    program: &str,
    args: I,
    opts: &RunOptions,
) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = build_command(program, args, opts)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, &e))?;

    tokio::select! {
        // dropping the in-flight future kills the child via kill_on_drop
        () = cancel.cancelled() => Err(SidecarError::Canceled),
        output = child.wait_with_output() => {
            let output = output.map_err(|e| SidecarError::CommandFailed {
                command: program.to_string(),
                message: format!("wait: {e}"),
            })?;
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(SidecarError::CommandFailed {
                    command: program.to_string(),
                    message: format!("exited with {}: {}", output.status, stderr.trim()),
                })
            }
        }
    }
}

fn build_command<I, S>(program: &str, args: I, opts: &RunOptions) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    for (key, value) in &opts.envs {
        command.env(key, value);
    }
    if let Some(dir) = &opts.dir {
        command.current_dir(dir);
    }
    command
}

fn spawn_error(program: &str, err: &std::io::Error) -> SidecarError {
    SidecarError::CommandFailed {
        command: program.to_string(),
        message: format!("spawn: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_capture_returns_stdout() {
        let cancel = CancellationToken::new();
        let out = run_capture(&cancel, "echo", ["hello"], &RunOptions::default())
            .await
            .expect("echo runs");
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn run_reports_nonzero_exit() {
        let cancel = CancellationToken::new();
        let err = run(&cancel, "false", Vec::<String>::new(), &RunOptions::default())
            .await
            .expect_err("false exits non-zero");
        assert!(matches!(err, SidecarError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_a_command_failure() {
        let cancel = CancellationToken::new();
        let err = run_capture(
            &cancel,
            "dockhand-test-definitely-missing",
            Vec::<String>::new(),
            &RunOptions::default(),
        )
        .await
        .expect_err("spawn fails");
        assert!(matches!(err, SidecarError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_running_command() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run(&cancel, "sleep", ["30"], &RunOptions::default())
            .await
            .expect_err("canceled");
        assert!(matches!(err, SidecarError::Canceled));
    }
}
