//! Cgroup Manager (C3 — spec.md §4.3).
//!
//! All operations run *inside* the session's container via
//! [`ContainerController::exec_inside`], mirroring
//! `examples/original_source/src/base_code_executor/main.py`'s
//! `docker exec ... bash -c "..."` pattern. Generalized from
//! `hyperbox-core::isolation::cgroups::CgroupManager`, which manages a
//! single host-side `hyperbox.slice`; here every per-test cgroup is a
//! sibling of `/sys/fs/cgroup/parent` inside the container (resolved Open
//! Question — see `DESIGN.md`).

use tracing::{debug, instrument, warn};

use crate::container::ContainerController;
use crate::error::{JudgeError, Result};
use crate::types::{CgroupHandle, CpuStat, MemoryEvents, Stats};

const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Prepares the parent cgroup once per session and manages per-test
/// children within the running container.
pub struct CgroupManager;

impl CgroupManager {
    /// One-time session preparation (spec.md §4.3 "Preparation"):
    /// 1. verify cgroup v2 is mounted,
    /// 2. create `parent/`,
    /// 3. migrate every root PID into `parent/cgroup.procs`,
    /// 4. verify `cpu`+`memory` are available controllers,
    /// 5. enable them on the subtree so sibling cgroups can set limits.
    #[instrument(skip(container))]
    pub async fn prepare(container: &ContainerController) -> Result<()> {
        if container.is_dry_run() {
            debug!("dry run: skipping cgroup preparation");
            return Ok(());
        }

        Self::verify_cgroup_v2(container).await?;

        Self::mkdir(container, "parent").await.map_err(|e| {
            if let JudgeError::CgroupCreate { reason, .. } = e {
                JudgeError::CgroupCreate {
                    name: "parent".to_string(),
                    reason,
                }
            } else {
                e
            }
        })?;

        Self::migrate_root_procs(container).await?;
        Self::verify_controllers(container).await?;
        Self::enable_subtree_control(container).await?;

        debug!("parent cgroup prepared");
        Ok(())
    }

    async fn verify_cgroup_v2(container: &ContainerController) -> Result<()> {
        let argv = vec![
            "bash".to_string(),
            "-c".to_string(),
            "mount | grep cgroup".to_string(),
        ];
        let out = container
            .exec_inside(&argv, None)
            .await
            .map_err(|_| JudgeError::CgroupMount)?;
        if out.stdout.contains("cgroup2") {
            Ok(())
        } else {
            Err(JudgeError::CgroupMount)
        }
    }

    async fn mkdir(container: &ContainerController, name: &str) -> Result<()> {
        let argv = vec![
            "mkdir".to_string(),
            format!("{CGROUP_ROOT}/{name}"),
        ];
        let out = container.exec_inside(&argv, None).await.map_err(|e| {
            JudgeError::CgroupCreate {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;
        if out.exit_code == 0 {
            Ok(())
        } else {
            Err(JudgeError::CgroupCreate {
                name: name.to_string(),
                reason: out.stderr,
            })
        }
    }

    async fn migrate_root_procs(container: &ContainerController) -> Result<()> {
        let script = format!(
            "for pid in $(cat {CGROUP_ROOT}/cgroup.procs); do echo $pid > {CGROUP_ROOT}/parent/cgroup.procs 2> /dev/null; done"
        );
        let argv = vec!["bash".to_string(), "-c".to_string(), script];
        // Kernel threads commonly refuse the write; that's expected and
        // silently skipped, matching the Python reference's `2>/dev/null`.
        let _ = container.exec_inside(&argv, None).await;
        Ok(())
    }

    async fn verify_controllers(container: &ContainerController) -> Result<()> {
        let argv = vec![
            "cat".to_string(),
            format!("{CGROUP_ROOT}/cgroup.controllers"),
        ];
        let out = container
            .exec_inside(&argv, None)
            .await
            .map_err(|e| JudgeError::CgroupControllerRead(e.to_string()))?;
        if out.exit_code != 0 {
            return Err(JudgeError::CgroupControllerRead(out.stderr));
        }
        let have_cpu = out.stdout.split_whitespace().any(|c| c == "cpu");
        let have_memory = out.stdout.split_whitespace().any(|c| c == "memory");
        if have_cpu && have_memory {
            Ok(())
        } else {
            Err(JudgeError::CgroupController(out.stdout.trim().to_string()))
        }
    }

    async fn enable_subtree_control(container: &ContainerController) -> Result<()> {
        let argv = vec![
            "bash".to_string(),
            "-c".to_string(),
            format!("echo '+cpu +memory' > {CGROUP_ROOT}/cgroup.subtree_control"),
        ];
        let out = container
            .exec_inside(&argv, None)
            .await
            .map_err(|e| JudgeError::CgroupSubtreeControlWrite(e.to_string()))?;
        if out.exit_code != 0 {
            return Err(JudgeError::CgroupSubtreeControlWrite(out.stderr));
        }

        let read_argv = vec![
            "cat".to_string(),
            format!("{CGROUP_ROOT}/cgroup.subtree_control"),
        ];
        let read = container
            .exec_inside(&read_argv, None)
            .await
            .map_err(|e| JudgeError::CgroupSubtreeControlRead(e.to_string()))?;
        let has_both = read.stdout.contains("cpu") && read.stdout.contains("memory");
        if has_both {
            Ok(())
        } else {
            Err(JudgeError::CgroupSubtreeControlRead(read.stdout))
        }
    }

    /// Create the per-test child cgroup (spec.md §4.3 "Per-test" `create_child`).
    #[instrument(skip(container))]
    pub async fn create_child(container: &ContainerController, handle: &CgroupHandle) -> Result<()> {
        if container.is_dry_run() {
            debug!(cgroup = handle.name(), "dry run: skipping cgroup creation");
            return Ok(());
        }
        Self::mkdir(container, handle.name()).await
    }

    /// Write `memory.max`, `memory.swap.max`, and `cpu.max` for the child
    /// cgroup (spec.md §4.3 "Per-test" `set_limits`).
    #[instrument(skip(container))]
    pub async fn set_limits(
        container: &ContainerController,
        handle: &CgroupHandle,
        constraints: &crate::types::Constraints,
    ) -> Result<()> {
        if container.is_dry_run() {
            debug!(cgroup = handle.name(), "dry run: skipping cgroup limits");
            return Ok(());
        }
        let name = handle.name();
        let script = format!(
            "echo {mem} > {root}/{name}/memory.max && \
             echo {swap} > {root}/{name}/memory.swap.max && \
             echo \"{cpu}\" > {root}/{name}/cpu.max",
            mem = constraints.memory_limit_bytes(),
            swap = constraints.memory_swap_limit_bytes(),
            cpu = constraints.cpu_max_line(),
            root = CGROUP_ROOT,
            name = name,
        );
        let argv = vec!["bash".to_string(), "-c".to_string(), script];
        let out = container.exec_inside(&argv, None).await.map_err(|e| {
            JudgeError::CgroupSetLimits {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;
        if out.exit_code == 0 {
            Ok(())
        } else {
            Err(JudgeError::CgroupSetLimits {
                name: name.to_string(),
                reason: out.stderr,
            })
        }
    }

    /// The shell fragment that moves the *current* shell's PID into the
    /// named cgroup before `exec`ing the program, so every fork inherits
    /// membership (spec.md §4.3 "Why sibling-of-parent", §4.6 step 3).
    #[must_use]
    pub fn join_self_fragment(handle: &CgroupHandle) -> String {
        format!("echo $$ > {CGROUP_ROOT}/{}/cgroup.procs", handle.name())
    }

    /// Read `memory.peak`, `memory.events`, `cpu.stat`, `pids.peak` for the
    /// named cgroup (spec.md §4.3 "Per-test" `read_stats`). Each file has a
    /// dedicated failure kind so a `JE` verdict can point at the exact
    /// counter that could not be read.
    #[instrument(skip(container))]
    pub async fn read_stats(container: &ContainerController, handle: &CgroupHandle) -> Result<Stats> {
        if container.is_dry_run() {
            debug!(cgroup = handle.name(), "dry run: synthesizing zeroed stats");
            return Ok(Stats::default());
        }
        let name = handle.name();

        let memory_peak = Self::read_file(container, name, "memory.peak")
            .await
            .map_err(|reason| JudgeError::MemoryPeakRead {
                name: name.to_string(),
                reason,
            })?;
        let memory_peak: u64 = memory_peak.trim().parse().unwrap_or(0);

        let memory_events_raw = Self::read_file(container, name, "memory.events")
            .await
            .map_err(|reason| JudgeError::MemoryEventsRead {
                name: name.to_string(),
                reason,
            })?;
        let memory_events = parse_memory_events(&memory_events_raw);

        let cpu_stat_raw = Self::read_file(container, name, "cpu.stat")
            .await
            .map_err(|reason| JudgeError::CpuStatRead {
                name: name.to_string(),
                reason,
            })?;
        let cpu_stat = parse_cpu_stat(&cpu_stat_raw);

        let pids_peak_raw = Self::read_file(container, name, "pids.peak")
            .await
            .map_err(|reason| JudgeError::PidsPeakRead {
                name: name.to_string(),
                reason,
            })?;
        let pids_peak: u64 = pids_peak_raw.trim().parse().unwrap_or(0);

        Ok(Stats {
            memory_peak,
            memory_events,
            cpu_stat,
            pids_peak,
        })
    }

    async fn read_file(
        container: &ContainerController,
        cgroup_name: &str,
        file: &str,
    ) -> std::result::Result<String, String> {
        let argv = vec![
            "cat".to_string(),
            format!("{CGROUP_ROOT}/{cgroup_name}/{file}"),
        ];
        let out = container
            .exec_inside(&argv, None)
            .await
            .map_err(|e| e.to_string())?;
        if out.exit_code == 0 {
            Ok(out.stdout)
        } else {
            Err(out.stderr)
        }
    }

    /// `rmdir` the child cgroup. Failure is non-fatal: it is converted to a
    /// warning, never propagated (spec.md §4.3 "Per-test" `destroy_child`).
    #[instrument(skip(container))]
    pub async fn destroy_child(container: &ContainerController, handle: &CgroupHandle) {
        if container.is_dry_run() {
            debug!(cgroup = handle.name(), "dry run: skipping cgroup cleanup");
            return;
        }
        let argv = vec!["rmdir".to_string(), format!("{CGROUP_ROOT}/{}", handle.name())];
        match container.exec_inside(&argv, None).await {
            Ok(out) if out.exit_code == 0 => {}
            Ok(out) => warn!(cgroup = handle.name(), stderr = %out.stderr, "cgroup cleanup failed"),
            Err(e) => warn!(cgroup = handle.name(), error = %e, "cgroup cleanup failed"),
        }
    }
}

fn parse_memory_events(raw: &str) -> MemoryEvents {
    let mut events = MemoryEvents::default();
    for line in raw.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let value: u64 = value.parse().unwrap_or(0);
        match key {
            "low" => events.low = value,
            "high" => events.high = value,
            "max" => events.max = value,
            "oom" => events.oom = value,
            "oom_kill" => events.oom_kill = value,
            "oom_group_kill" => events.oom_group_kill = value,
            _ => {}
        }
    }
    events
}

fn parse_cpu_stat(raw: &str) -> CpuStat {
    let mut stat = CpuStat::default();
    for line in raw.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let value: u64 = value.parse().unwrap_or(0);
        match key {
            "usage_usec" => stat.usage_usec = value,
            "user_usec" => stat.user_usec = value,
            "system_usec" => stat.system_usec = value,
            "nr_periods" => stat.nr_periods = value,
            "nr_throttled" => stat.nr_throttled = value,
            "throttled_usec" => stat.throttled_usec = value,
            "nr_bursts" => stat.nr_bursts = value,
            "burst_usec" => stat.burst_usec = value,
            _ => {}
        }
    }
    stat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory_events() {
        let raw = "low 0\nhigh 1\nmax 2\noom 1\noom_kill 1\noom_group_kill 0\n";
        let events = parse_memory_events(raw);
        assert_eq!(events.high, 1);
        assert_eq!(events.oom, 1);
        assert_eq!(events.oom_kill, 1);
        assert_eq!(events.oom_group_kill, 0);
    }

    #[test]
    fn parses_cpu_stat() {
        let raw = "usage_usec 1000000\nuser_usec 800000\nsystem_usec 200000\nnr_periods 5\nnr_throttled 1\nthrottled_usec 300\nnr_bursts 0\nburst_usec 0\n";
        let stat = parse_cpu_stat(raw);
        assert_eq!(stat.usage_usec, 1_000_000);
        assert_eq!(stat.user_usec, 800_000);
        assert_eq!(stat.nr_throttled, 1);
    }

    #[test]
    fn child_cgroup_handle_names_match_spec() {
        let handle = CgroupHandle::for_test(7);
        assert_eq!(handle.name(), "test7");
    }

    #[test]
    fn join_fragment_targets_sibling_of_parent() {
        let handle = CgroupHandle::for_test(3);
        let fragment = CgroupManager::join_self_fragment(&handle);
        assert_eq!(fragment, "echo $$ > /sys/fs/cgroup/test3/cgroup.procs");
    }
}
