//! Compile Stage (C4 — spec.md §4.4).

use tracing::{info, instrument, warn};

use crate::container::ContainerController;
use crate::error::{JudgeError, Result};
use crate::types::{CommandHooks, SessionConfig};

/// Outcome of the one compile attempt a session ever makes.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    /// Compilation was skipped (`disable_compile = true`).
    Skipped,
    /// The compiler exited zero.
    Success,
    /// The compiler exited nonzero; carries its combined output for the
    /// `CE` verdict's `verdict_details`. This is **not** a [`JudgeError`] —
    /// spec.md §4.4 is explicit that a nonzero compiler exit is a verdict,
    /// not an exception.
    Failed {
        /// Combined stdout+stderr from the compiler invocation.
        output: String,
    },
}

/// Runs the caller-supplied compile command once, as the non-root user,
/// inside the session's container.
#[instrument(skip(container, config, hooks))]
pub async fn compile(
    container: &ContainerController,
    config: &SessionConfig,
    hooks: &dyn CommandHooks,
) -> Result<CompileOutcome> {
    if config.disable_compile {
        info!("compilation disabled; skipping compile stage");
        return Ok(CompileOutcome::Skipped);
    }

    let compile_command = hooks.compile_command(&config.container_work_dir);
    if compile_command.is_empty() {
        return Err(JudgeError::Configuration(
            "compile_command is empty but disable_compile is false".to_string(),
        ));
    }

    // Run as the non-root user via a login shell, matching
    // `main.py::_compile`'s `su - {non_root_user} -c '{compile_command}'`.
    let script = format!("su - {} -c '{}'", config.non_root_user, compile_command);
    let argv = vec!["bash".to_string(), "-c".to_string(), script];

    let out = container
        .exec_inside(&argv, None)
        .await
        .map_err(|e| JudgeError::Compile(e.to_string()))?;

    if out.exit_code == 0 {
        info!("compilation successful");
        Ok(CompileOutcome::Success)
    } else {
        warn!(exit_code = out.exit_code, "compilation failed");
        let mut output = out.stdout;
        if !out.stderr.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&out.stderr);
        }
        Ok(CompileOutcome::Failed { output })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct EmptyCompileHooks;
    impl CommandHooks for EmptyCompileHooks {
        fn compile_command(&self, _work_dir: &Path) -> String {
            String::new()
        }
        fn run_command(&self, work_dir: &Path) -> String {
            format!("{}/a.out", work_dir.display())
        }
    }

    fn base_config(disable_compile: bool) -> SessionConfig {
        SessionConfig {
            docker_image: "alpine:3.18".to_string(),
            container_user: "root".to_string(),
            non_root_user: "judge".to_string(),
            host_src_dir: "/tmp/src".into(),
            container_work_dir: "/app".into(),
            container_name: None,
            constraints: crate::types::Constraints {
                time_limit_s: 1,
                memory_limit_mb: 256,
                memory_swap_limit_mb: 0,
                cpu_quota: 1_000_000,
                cpu_period: 1_000_000,
            },
            disable_compile,
            lazy_container: false,
            early_exit: false,
            dry_run: true,
            volume: None,
        }
    }

    #[test]
    fn empty_compile_command_requires_disable_compile() {
        let config = base_config(false);
        let hooks = EmptyCompileHooks;
        assert!(hooks.compile_command(&config.container_work_dir).is_empty());
    }
}
