//! Command Shim (C1 — spec.md §4.1).
//!
//! Builds and executes external-process command lines, capturing
//! stdout/stderr/exit code and enforcing a wall-clock fallback timeout.
//! Grounded on `hyperbox-core::runtime::crun::CrunRuntime::run_crun`'s
//! `tokio::time::timeout` wrapper around `Command::output()`.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{JudgeError, Result};

/// Outcome of a single external-process invocation.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Process exit code. 124 if the wall-clock fallback timeout fired.
    pub exit_code: i32,
    /// Wall-clock duration of the call.
    pub wall_time: Duration,
    /// Whether the wall-clock fallback timeout fired (as opposed to the
    /// child exiting with 124 of its own accord).
    pub timed_out: bool,
}

/// Render a command and its arguments for logging/dry-run display,
/// matching `format_cmd` in `examples/original_source/src/base_code_executor/main.py`.
#[must_use]
pub fn render_command(argv: &[String]) -> String {
    argv.join(" \\\n    ")
}

/// Executes external-process command lines on behalf of the engine.
#[derive(Debug, Clone, Default)]
pub struct CommandShim {
    dry_run: bool,
}

impl CommandShim {
    /// Create a shim. In `dry_run` mode, `exec` never spawns a process: it
    /// logs the rendered command and returns synthesized placeholders.
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Run `argv[0] argv[1..]`, optionally feeding `stdin`, bounded by
    /// `timeout`. Fails with [`JudgeError::Cmd`] only on spawn failure —
    /// a nonzero exit code is a normal, successful [`CmdOutput`].
    pub async fn exec(
        &self,
        argv: &[String],
        stdin: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CmdOutput> {
        let rendered = render_command(argv);
        debug!(command = %rendered, "executing command");

        if self.dry_run {
            println!("{rendered}");
            return Ok(CmdOutput {
                stdout: "<stdout>".to_string(),
                stderr: "<stderr>".to_string(),
                exit_code: 0,
                wall_time: Duration::ZERO,
                timed_out: false,
            });
        }

        let Some((program, args)) = argv.split_first() else {
            return Err(JudgeError::Cmd("empty command".to_string()));
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| JudgeError::Cmd(format!("failed to spawn {program}: {e}")))?;

        if let Some(input) = stdin {
            use tokio::io::AsyncWriteExt;
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes())
                    .await
                    .map_err(|e| JudgeError::Cmd(format!("failed to write stdin: {e}")))?;
            }
        }

        let start = Instant::now();
        let wait = child.wait_with_output();

        let (output, timed_out) = match timeout {
            Some(d) => match tokio::time::timeout(d, wait).await {
                Ok(result) => (
                    result.map_err(|e| JudgeError::Cmd(format!("command failed: {e}")))?,
                    false,
                ),
                Err(_) => {
                    warn!(command = %rendered, "wall-clock fallback timeout fired");
                    return Ok(CmdOutput {
                        stdout: String::new(),
                        stderr: String::new(),
                        exit_code: 124,
                        wall_time: start.elapsed(),
                        timed_out: true,
                    });
                }
            },
            None => (
                wait.await
                    .map_err(|e| JudgeError::Cmd(format!("command failed: {e}")))?,
                false,
            ),
        };

        Ok(CmdOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            wall_time: start.elapsed(),
            timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_returns_placeholder_without_spawning() {
        let shim = CommandShim::new(true);
        let out = shim
            .exec(&["/nonexistent/binary".to_string()], None, None)
            .await
            .unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "<stdout>");
    }

    #[tokio::test]
    async fn exec_captures_exit_code_and_stdout() {
        let shim = CommandShim::new(false);
        let out = shim
            .exec(
                &["echo".to_string(), "hello".to_string()],
                None,
                Some(Duration::from_secs(5)),
            )
            .await
            .unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.trim(), "hello");
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn exec_pipes_stdin_through() {
        let shim = CommandShim::new(false);
        let out = shim
            .exec(&["cat".to_string()], Some("piped\n"), None)
            .await
            .unwrap();
        assert_eq!(out.stdout, "piped\n");
    }

    #[tokio::test]
    async fn exec_applies_fallback_timeout() {
        let shim = CommandShim::new(false);
        let out = shim
            .exec(
                &["sleep".to_string(), "2".to_string()],
                None,
                Some(Duration::from_millis(50)),
            )
            .await
            .unwrap();
        assert_eq!(out.exit_code, 124);
        assert!(out.timed_out);
    }

    #[tokio::test]
    async fn exec_spawn_failure_is_an_error() {
        let shim = CommandShim::new(false);
        let result = shim
            .exec(&["/no/such/binary-xyz".to_string()], None, None)
            .await;
        assert!(result.is_err());
    }
}
