//! Core type definitions for the judging engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::verdict::Verdict;

/// Resource constraints for a single judging session, shared by every test
/// case it runs (spec.md §3 "Constraints").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Constraints {
    /// Wall-clock time limit in seconds.
    pub time_limit_s: u32,
    /// Memory limit in megabytes.
    pub memory_limit_mb: u64,
    /// Swap limit in megabytes (absolute cap, `memory.swap.max` semantics).
    pub memory_swap_limit_mb: u64,
    /// `cpu.max` quota, in microseconds per period.
    pub cpu_quota: u64,
    /// `cpu.max` period, in microseconds.
    pub cpu_period: u64,
}

impl Constraints {
    /// Memory limit expressed in bytes.
    #[must_use]
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb * 1_048_576
    }

    /// Swap limit expressed in bytes.
    #[must_use]
    pub fn memory_swap_limit_bytes(&self) -> u64 {
        self.memory_swap_limit_mb * 1_048_576
    }

    /// The container-level memory cap, strictly greater than the per-test
    /// limit so the kernel OOM-kills the test child, not the container
    /// (spec.md §3 invariant).
    #[must_use]
    pub fn container_memory_limit_mb(&self) -> u64 {
        self.memory_limit_mb + 100
    }

    /// The container-level memory+swap cap.
    #[must_use]
    pub fn container_memory_swap_limit_mb(&self) -> u64 {
        self.memory_limit_mb + self.memory_swap_limit_mb + 100
    }

    /// Wall-clock fallback timeout applied by the `timeout` shell wrapper
    /// and the Command Shim: `5 * time_limit_s` (spec.md §4.1, §5).
    #[must_use]
    pub fn fallback_timeout_s(&self) -> u64 {
        u64::from(self.time_limit_s) * 5
    }

    /// `cpu.max` file contents: `"<quota> <period>"`.
    #[must_use]
    pub fn cpu_max_line(&self) -> String {
        format!("{} {}", self.cpu_quota, self.cpu_period)
    }
}

/// Unique identifier for a running container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Wrap an ID string returned by the container runtime.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate a fresh container name, matching the Python reference's
/// `uuid.uuid4().hex` default (spec.md §6 `container_name`).
#[must_use]
pub fn generate_container_name() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Caller-provided extension hooks (spec.md §6 "Caller extension hooks").
///
/// Modeled as a capability trait rather than an abstract base class: a
/// caller implements `compile_command`/`run_command` for its language and
/// hands the implementation to [`crate::session::Session::new`].
pub trait CommandHooks: Send + Sync {
    /// Build the compile command line, to be run once as `non_root_user`.
    /// An empty string is only valid when the session's `disable_compile`
    /// is set.
    fn compile_command(&self, work_dir: &std::path::Path) -> String;

    /// Build the run command line, executed once per test case with stdin
    /// redirected from the test's input file.
    fn run_command(&self, work_dir: &std::path::Path) -> String;
}

/// Configuration for a judging [`crate::session::Session`] (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Docker image to run the submission in.
    pub docker_image: String,
    /// Container identity allowed to manage cgroups (typically `root`).
    pub container_user: String,
    /// Identity that compiles and runs the submitted program.
    pub non_root_user: String,
    /// Host path containing `input/` and `output/`.
    pub host_src_dir: PathBuf,
    /// Working directory inside the container (default `/app`).
    pub container_work_dir: PathBuf,
    /// Explicit container name; a 32-hex token is generated if absent.
    pub container_name: Option<String>,
    /// Resource constraints shared by all test cases.
    pub constraints: Constraints,
    /// Skip the compile stage (interpreted languages).
    pub disable_compile: bool,
    /// Defer container creation to the first test run.
    pub lazy_container: bool,
    /// Stop yielding after the first non-AC verdict.
    pub early_exit: bool,
    /// Print commands instead of executing them; synthesize placeholder results.
    pub dry_run: bool,
    /// Optional named volume, used instead of a bind mount.
    pub volume: Option<String>,
}

impl SessionConfig {
    /// Resolve the effective container name, generating one if unset.
    #[must_use]
    pub fn resolved_container_name(&self) -> String {
        self.container_name
            .clone()
            .unwrap_or_else(generate_container_name)
    }
}

/// A single discovered test case (spec.md §3 "TestCase").
#[derive(Debug, Clone)]
pub struct TestCase {
    /// 1-based test index.
    pub index: u32,
    /// Path to the input file on the host.
    pub input_path: PathBuf,
    /// Path to the expected-output file on the host, if discovered.
    pub expected_output_path: Option<PathBuf>,
}

/// A named child cgroup belonging to exactly one test (spec.md §3 "CgroupHandle").
#[derive(Debug, Clone)]
pub struct CgroupHandle {
    name: String,
}

impl CgroupHandle {
    /// Construct the handle for test `index` (`test<index>`).
    #[must_use]
    pub fn for_test(index: u32) -> Self {
        Self {
            name: format!("test{index}"),
        }
    }

    /// The handle for the session-scoped `parent` cgroup.
    #[must_use]
    pub fn parent() -> Self {
        Self {
            name: "parent".to_string(),
        }
    }

    /// Cgroup directory name, relative to `/sys/fs/cgroup`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Memory pressure/OOM counters from `memory.events` (spec.md §3 "Stats").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MemoryEvents {
    /// Count of times usage crossed `memory.low`.
    pub low: u64,
    /// Count of times usage crossed `memory.high`.
    pub high: u64,
    /// Count of times usage crossed `memory.max`.
    pub max: u64,
    /// Count of OOM events.
    pub oom: u64,
    /// Count of processes killed due to OOM.
    pub oom_kill: u64,
    /// Count of process groups killed due to OOM.
    pub oom_group_kill: u64,
}

/// CPU accounting counters from `cpu.stat`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CpuStat {
    /// Total CPU time in microseconds.
    pub usage_usec: u64,
    /// User-mode CPU time in microseconds.
    pub user_usec: u64,
    /// System-mode CPU time in microseconds.
    pub system_usec: u64,
    /// Number of elapsed enforcement periods.
    pub nr_periods: u64,
    /// Number of periods the group was throttled in.
    pub nr_throttled: u64,
    /// Total time throttled, in microseconds.
    pub throttled_usec: u64,
    /// Number of CPU bursts.
    pub nr_bursts: u64,
    /// Total burst time, in microseconds.
    pub burst_usec: u64,
}

/// Resource counters read from the kernel after a test's program exits
/// (spec.md §3 "Stats").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stats {
    /// Peak memory usage in bytes (`memory.peak`).
    pub memory_peak: u64,
    /// Memory pressure/OOM counters (`memory.events`).
    pub memory_events: MemoryEvents,
    /// CPU accounting counters (`cpu.stat`).
    pub cpu_stat: CpuStat,
    /// Peak PID count (`pids.peak`).
    pub pids_peak: u64,
}

/// Legacy 3-tuple execution outcome (spec.md §9 "two result shapes"). Kept
/// internally as the raw observation feeding the verdict resolver; never
/// exposed as a standalone public return value — see `DESIGN.md`.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Process exit code, or the `timeout` wrapper's 124 on fallback expiry.
    pub exit_code: i32,
    /// Wall-clock duration of the run, in seconds.
    pub wall_time_s: f64,
}

/// The result of judging a single test case (spec.md §3 "TestResult").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// 1-based test index.
    pub test_case: u32,
    /// Exit code of the executed program (or `timeout`'s 124).
    pub exit_code: i32,
    /// Resource counters observed for this test.
    pub stats: Stats,
    /// Symbolic verdict code (`"AC"`, `"WA"`, ...).
    pub verdict: Verdict,
    /// Human-readable verdict label.
    pub verdict_label: String,
    /// Human-readable verdict details.
    pub verdict_details: String,
    /// The input fed to the program.
    pub input: String,
    /// The program's actual output.
    pub actual_output: String,
    /// The expected output.
    pub expected_output: String,
}
