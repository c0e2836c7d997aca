//! Error types for the judging engine.

use thiserror::Error;

/// Result type alias using [`JudgeError`].
pub type Result<T> = std::result::Result<T, JudgeError>;

/// Error taxonomy for the sandboxed judging engine.
///
/// Grouped by recovery policy (see the error handling design in
/// `SPEC_FULL.md` §7):
/// - infrastructure errors are fatal to the session,
/// - per-test infrastructure errors are caught and downgraded to a `JE`
///   verdict for the affected test,
/// - user-program failures are never represented here at all — they
///   surface only as a [`crate::verdict::Verdict`].
#[derive(Error, Debug)]
pub enum JudgeError {
    /// `docker info` (or equivalent liveness probe) returned nonzero.
    #[error("container runtime daemon is not reachable: {0}")]
    DockerDaemon(String),

    /// Container creation failed.
    #[error("failed to create container: {0}")]
    ContainerCreate(String),

    /// Best-effort container teardown failed.
    #[error("failed to clean up container: {0}")]
    ContainerCleanup(String),

    /// cgroup v2 is not mounted inside the container.
    #[error("cgroup v2 is not mounted")]
    CgroupMount,

    /// `mkdir` of a cgroup directory failed.
    #[error("failed to create cgroup {name}: {reason}")]
    CgroupCreate {
        /// Cgroup name (e.g. `parent`, `test3`).
        name: String,
        /// Underlying failure reason.
        reason: String,
    },

    /// `rmdir` of a cgroup directory failed. Non-fatal; logged as a warning.
    #[error("failed to clean up cgroup {name}: {reason}")]
    CgroupCleanup {
        /// Cgroup name.
        name: String,
        /// Underlying failure reason.
        reason: String,
    },

    /// Reading `cgroup.controllers` failed.
    #[error("failed to read cgroup.controllers: {0}")]
    CgroupControllerRead(String),

    /// Required controllers (`cpu`, `memory`) are absent from `cgroup.controllers`.
    #[error("required cgroup controllers not available: {0}")]
    CgroupController(String),

    /// Reading `cgroup.subtree_control` failed.
    #[error("failed to read cgroup.subtree_control: {0}")]
    CgroupSubtreeControlRead(String),

    /// Writing `cgroup.subtree_control` failed.
    #[error("failed to write cgroup.subtree_control: {0}")]
    CgroupSubtreeControlWrite(String),

    /// Writing a limit file (`memory.max`, `memory.swap.max`, `cpu.max`) failed.
    #[error("failed to set limits for cgroup {name}: {reason}")]
    CgroupSetLimits {
        /// Cgroup name.
        name: String,
        /// Underlying failure reason.
        reason: String,
    },

    /// `memory.peak` could not be read.
    #[error("failed to read memory.peak for {name}: {reason}")]
    MemoryPeakRead {
        /// Cgroup name.
        name: String,
        /// Underlying failure reason.
        reason: String,
    },

    /// `memory.events` could not be read or parsed.
    #[error("failed to read memory.events for {name}: {reason}")]
    MemoryEventsRead {
        /// Cgroup name.
        name: String,
        /// Underlying failure reason.
        reason: String,
    },

    /// `cpu.stat` could not be read or parsed.
    #[error("failed to read cpu.stat for {name}: {reason}")]
    CpuStatRead {
        /// Cgroup name.
        name: String,
        /// Underlying failure reason.
        reason: String,
    },

    /// `pids.peak` could not be read.
    #[error("failed to read pids.peak for {name}: {reason}")]
    PidsPeakRead {
        /// Cgroup name.
        name: String,
        /// Underlying failure reason.
        reason: String,
    },

    /// The compile stage hit an infrastructural failure (shell not
    /// executable, container unreachable). A nonzero compiler exit is
    /// **not** this — it is a `CE` verdict, never this variant.
    #[error("compile stage infrastructure failure: {0}")]
    Compile(String),

    /// Cleaning up a leftover `actual_output` file failed. Warning only.
    #[error("failed to clean up actual output file: {0}")]
    ActualOutputCleanup(String),

    /// Spawning or communicating with an external process failed.
    #[error("command execution failed: {0}")]
    Cmd(String),

    /// A configuration value was invalid (e.g. empty compile command
    /// without `disable_compile`).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Test discovery found an input file with no matching expected-output
    /// file. Per spec this is not raised — it is converted to a `JE`
    /// verdict for that test index — but the discovery layer still needs a
    /// typed error to carry the detail before conversion.
    #[error("missing expected output for test case {0}")]
    MissingExpectedOutput(u32),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl JudgeError {
    /// True for errors that are fatal to the whole session (spec.md §7,
    /// "Infrastructure" and "Shim" groups).
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::DockerDaemon(_)
                | Self::ContainerCreate(_)
                | Self::ContainerCleanup(_)
                | Self::CgroupMount
                | Self::CgroupControllerRead(_)
                | Self::CgroupController(_)
                | Self::CgroupSubtreeControlRead(_)
                | Self::CgroupSubtreeControlWrite(_)
                | Self::Cmd(_)
        )
    }

    /// True for per-test infrastructure errors that are downgraded to a
    /// `JE` verdict rather than propagated (spec.md §7, "Per-test
    /// infrastructure" group).
    #[must_use]
    pub fn is_per_test(&self) -> bool {
        matches!(
            self,
            Self::CgroupCreate { .. }
                | Self::CgroupSetLimits { .. }
                | Self::CgroupCleanup { .. }
                | Self::MemoryPeakRead { .. }
                | Self::MemoryEventsRead { .. }
                | Self::CpuStatRead { .. }
                | Self::PidsPeakRead { .. }
                | Self::MissingExpectedOutput(_)
        )
    }
}
