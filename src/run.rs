//! Run Stage (C6 — spec.md §4.6).

use std::time::Duration;

use tracing::{info, instrument};

use crate::cgroup::CgroupManager;
use crate::container::ContainerController;
use crate::error::Result;
use crate::types::{CgroupHandle, CommandHooks, Constraints, SessionConfig, Stats, TestCase};

/// Raw observation produced by running one test case, before verdict
/// classification (spec.md §4.6 steps 1-6).
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Exit code of the composed shell (124 on fallback timeout).
    pub exit_code: i32,
    /// Resource counters read after the program exited, or `None` if the
    /// cgroup read itself failed (converted to `JE` by the caller).
    pub stats: Option<Stats>,
    /// Wall-clock duration of the exec call.
    pub wall_time_s: f64,
    /// Whether the wall-clock fallback timeout fired.
    pub timed_out_by_fallback: bool,
    /// The input actually fed to the program.
    pub input: String,
    /// Captured stdout (used as actual output unless the run command wrote
    /// to `actual_output/<i>.txt`, per spec.md §4.6 step 6).
    pub stdout: String,
}

/// Run a single test case: create + limit its cgroup, compose the shell
/// that joins the cgroup and then `exec`s the program under `timeout`,
/// invoke it, read back counters, and destroy the cgroup.
#[instrument(skip(container, config, hooks, test))]
pub async fn run_test(
    container: &ContainerController,
    config: &SessionConfig,
    hooks: &dyn CommandHooks,
    test: &TestCase,
    input_prefix: &str,
    timeout_override: Option<Duration>,
) -> Result<RunResult> {
    let handle = CgroupHandle::for_test(test.index);

    CgroupManager::create_child(container, &handle).await?;
    CgroupManager::set_limits(container, &handle, &config.constraints).await?;

    let input = tokio::fs::read_to_string(&test.input_path).await?;

    let run_command = hooks.run_command(&config.container_work_dir);
    let fallback = timeout_override
        .map(|d| d.as_secs())
        .unwrap_or_else(|| config.constraints.fallback_timeout_s());

    // Compose: write the shell's own PID into the cgroup, then drop to the
    // non-root user and exec `timeout <T> <run_command>` with stdin
    // redirected from the input file already staged in the container
    // (spec.md §4.6 step 3; stdin resolved per SPEC_FULL.md §10.2). The
    // in-container path must use the same `<prefix><index>.txt` naming
    // discovery used on the host (`main.py:549`), not a bare index.
    let input_path_in_container = format!(
        "{}/input/{input_prefix}{}.txt",
        config.container_work_dir.display(),
        test.index
    );
    let inner = format!("timeout {fallback} {run_command} < {input_path_in_container}");
    let join_fragment = CgroupManager::join_self_fragment(&handle);
    let script = format!(
        "{join} && su - {user} -c '{inner}'",
        join = join_fragment,
        user = config.non_root_user,
        inner = inner.replace('\'', "'\\''"),
    );

    let argv = vec!["bash".to_string(), "-c".to_string(), script];
    let out = container.exec_inside(&argv, Some(&input)).await?;

    let stats = match CgroupManager::read_stats(container, &handle).await {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!(test = test.index, error = %e, "stats read failed");
            None
        }
    };

    CgroupManager::destroy_child(container, &handle).await;

    info!(test = test.index, exit_code = out.exit_code, "test run complete");

    Ok(RunResult {
        exit_code: out.exit_code,
        stats,
        wall_time_s: out.wall_time.as_secs_f64(),
        timed_out_by_fallback: out.timed_out || out.exit_code == 124,
        input,
        stdout: out.stdout,
    })
}

/// Resolve the actual-output text for a test: prefer
/// `<work>/actual_output/<i>.txt` when the run command wrote one there,
/// fall back to captured stdout (spec.md §4.6 step 6).
pub async fn resolve_actual_output(
    host_work_dir: &std::path::Path,
    index: u32,
    stdout: &str,
) -> Result<String> {
    let explicit_path = host_work_dir.join("actual_output").join(format!("{index}.txt"));
    match tokio::fs::read_to_string(&explicit_path).await {
        Ok(text) => Ok(text),
        Err(_) => Ok(stdout.to_string()),
    }
}

/// Fallback timeout, duplicated here for callers that only have
/// [`Constraints`] on hand (not a full [`SessionConfig`]).
#[must_use]
pub fn fallback_timeout(constraints: &Constraints, override_s: Option<u64>) -> Duration {
    Duration::from_secs(override_s.unwrap_or_else(|| constraints.fallback_timeout_s()))
}
