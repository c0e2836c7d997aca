//! # Judge Engine
//!
//! A sandboxed code-judging engine: compile a submission once, run it
//! against a set of test cases inside a Docker container under cgroup v2
//! resource limits, and yield a verdict per test case as soon as it's
//! available.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Session                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Discovery  │  Compile  │  Run  │  Verdict  │  Comparator   │
//! ├─────────────────────────────────────────────────────────────┤
//! │            Cgroup Manager (cgroup v2, per-test limits)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │            Container Controller (bollard / Docker)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │            Command Shim (external process execution)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cgroup;
pub mod comparator;
pub mod compile;
pub mod container;
pub mod discovery;
pub mod error;
pub mod run;
pub mod session;
pub mod shim;
pub mod types;
pub mod verdict;

pub use error::{JudgeError, Result};
pub use session::Session;
pub use types::{
    CgroupHandle, CommandHooks, Constraints, ContainerId, CpuStat, MemoryEvents, SessionConfig,
    Stats, TestCase, TestResult,
};
pub use verdict::Verdict;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export of the types most callers need.
pub mod prelude {
    pub use crate::error::{JudgeError, Result};
    pub use crate::session::Session;
    pub use crate::types::{CommandHooks, Constraints, SessionConfig, TestCase, TestResult};
    pub use crate::verdict::Verdict;
}
