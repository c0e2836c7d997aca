//! Verdict classification (C7 — spec.md §4.7).

use serde::{Deserialize, Serialize};

use crate::types::{Constraints, Stats};

/// Final classification of a test case's execution (spec.md §3 "Verdict").
///
/// Mirrors `examples/original_source/src/arbiterx/verdicts.py`'s `Verdict`
/// enum: each member carries a fixed human label and a details string,
/// expressed here as methods instead of a tuple-valued Python `Enum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Accepted.
    Ac,
    /// Wrong Answer.
    Wa,
    /// Time Limit Exceeded.
    Tle,
    /// Memory Limit Exceeded.
    Mle,
    /// Runtime Error.
    Re,
    /// Output Limit Exceeded.
    Ole,
    /// Compilation Error.
    Ce,
    /// Idleness Limit Exceeded.
    Ile,
    /// Judgement Error.
    Je,
}

impl Verdict {
    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ac => "Accepted",
            Self::Wa => "Wrong Answer",
            Self::Tle => "Time Limit Exceeded",
            Self::Mle => "Memory Limit Exceeded",
            Self::Re => "Runtime Error",
            Self::Ole => "Output Limit Exceeded",
            Self::Ce => "Compilation Error",
            Self::Ile => "Idleness Limit Exceeded",
            Self::Je => "Judgement Error",
        }
    }

    /// Default human-readable detail string for this verdict, used when the
    /// classifier has no more specific message to attach.
    #[must_use]
    pub fn default_details(self) -> &'static str {
        match self {
            Self::Ac => "The program ran successfully and produced the correct output.",
            Self::Wa => "The program ran successfully but produced incorrect output.",
            Self::Tle => "The program took longer than the allowed execution time.",
            Self::Mle => "The program used more memory than the allowed limit.",
            Self::Re => "The program terminated abnormally with a non-zero exit code.",
            Self::Ole => "The program produced more output than the allowed limit.",
            Self::Ce => "The program failed to compile successfully.",
            Self::Ile => {
                "The program did not produce any output for too long, often indicating \
                 an infinite loop that does not consume CPU time."
            }
            Self::Je => "The judgement process failed to produce a verdict.",
        }
    }

    /// Short symbolic code, matching spec.md's serialized form (`"AC"`, ...).
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Ac => "AC",
            Self::Wa => "WA",
            Self::Tle => "TLE",
            Self::Mle => "MLE",
            Self::Re => "RE",
            Self::Ole => "OLE",
            Self::Ce => "CE",
            Self::Ile => "ILE",
            Self::Je => "JE",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Outcome of comparing actual vs. expected output (C8 result).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    /// Outputs match.
    Match,
    /// Outputs differ.
    Mismatch,
}

/// The full observation record the classifier needs (spec.md §4.7).
#[derive(Debug, Clone)]
pub struct Observation {
    /// Process exit code (or `timeout`'s 124).
    pub exit_code: i32,
    /// Whether the `timeout` fallback wrapper fired (exit code 124).
    pub timed_out_by_fallback: bool,
    /// Resource counters for the test.
    pub stats: Stats,
    /// Wall-clock time of the run, in seconds.
    pub wall_time_s: f64,
    /// Size of the actual output, in bytes.
    pub output_bytes: usize,
    /// Size of the expected output, in bytes.
    pub expected_bytes: usize,
    /// Output-limit override; defaults to `max(10 MiB, 2 * expected_bytes)`.
    pub output_limit_bytes: Option<usize>,
    /// Result of the output comparator, or `None` if it was never reached
    /// (an earlier rule already classified the test).
    pub compare_result: Option<CompareResult>,
}

impl Observation {
    fn effective_output_limit(&self) -> usize {
        self.output_limit_bytes
            .unwrap_or_else(|| (10 * 1024 * 1024).max(2 * self.expected_bytes))
    }
}

/// Decoded process termination, distinguishing the signal that killed a
/// process from a plain nonzero exit (spec.md §4.7 "exit-code-to-signal
/// decoding"). Grounded on the `WaitStatus` pattern in
/// `other_examples/9b5325ba_ishantheperson-c0check__src-launcher.rs.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited normally with the given code.
    Exited(i32),
    /// Killed by SIGKILL (often OOM, or the `timeout` fallback's `-k`).
    Killed,
    /// Killed by a crash signal (SIGSEGV, SIGFPE, SIGABRT, ...).
    Crashed(i32),
}

impl Termination {
    /// Decode a raw waitpid-style exit status the way a shell reports it:
    /// `128 + signal` for signal deaths, the code itself otherwise.
    #[must_use]
    pub fn from_shell_status(status: i32) -> Self {
        if status >= 128 {
            let signal = status - 128;
            match signal {
                9 => Self::Killed,
                11 | 8 | 6 | 4 | 7 => Self::Crashed(status),
                other => Self::Crashed(128 + other),
            }
        } else {
            Self::Exited(status)
        }
    }
}

/// Classify an [`Observation`] into a [`Verdict`], following the ordered
/// rule table in spec.md §4.7 — first match wins.
#[must_use]
pub fn classify(obs: &Observation, constraints: &Constraints) -> Verdict {
    let mem = &obs.stats.memory_events;
    if mem.oom > 0 || mem.oom_kill > 0 || mem.oom_group_kill > 0
        || obs.stats.memory_peak >= constraints.memory_limit_bytes()
    {
        return Verdict::Mle;
    }

    let cpu_used_s = obs.stats.cpu_stat.usage_usec as f64 / 1_000_000.0;
    let time_limit_s = f64::from(constraints.time_limit_s);

    if obs.wall_time_s >= time_limit_s && cpu_used_s < time_limit_s * 0.1 {
        return Verdict::Ile;
    }

    let termination = Termination::from_shell_status(obs.exit_code);
    if cpu_used_s >= time_limit_s
        || obs.timed_out_by_fallback
        || obs.exit_code == 124
        || matches!(termination, Termination::Killed)
    {
        return Verdict::Tle;
    }

    if obs.output_bytes > obs.effective_output_limit() {
        return Verdict::Ole;
    }

    if obs.exit_code != 0 {
        return Verdict::Re;
    }

    match obs.compare_result {
        Some(CompareResult::Mismatch) => Verdict::Wa,
        Some(CompareResult::Match) => Verdict::Ac,
        None => Verdict::Je,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CpuStat, MemoryEvents};

    fn constraints() -> Constraints {
        Constraints {
            time_limit_s: 1,
            memory_limit_mb: 256,
            memory_swap_limit_mb: 0,
            cpu_quota: 1_000_000,
            cpu_period: 1_000_000,
        }
    }

    fn base_observation() -> Observation {
        Observation {
            exit_code: 0,
            timed_out_by_fallback: false,
            stats: Stats::default(),
            wall_time_s: 0.01,
            output_bytes: 6,
            expected_bytes: 6,
            output_limit_bytes: None,
            compare_result: Some(CompareResult::Match),
        }
    }

    #[test]
    fn accepted_happy_path() {
        let obs = base_observation();
        assert_eq!(classify(&obs, &constraints()), Verdict::Ac);
    }

    #[test]
    fn wrong_answer() {
        let mut obs = base_observation();
        obs.compare_result = Some(CompareResult::Mismatch);
        assert_eq!(classify(&obs, &constraints()), Verdict::Wa);
    }

    #[test]
    fn tle_cpu_bound() {
        let mut obs = base_observation();
        obs.exit_code = 137;
        obs.wall_time_s = 1.2;
        obs.stats.cpu_stat = CpuStat {
            usage_usec: 1_000_001,
            ..Default::default()
        };
        assert_eq!(classify(&obs, &constraints()), Verdict::Tle);
    }

    #[test]
    fn tle_via_fallback_timeout_exit_code() {
        let mut obs = base_observation();
        obs.exit_code = 124;
        obs.timed_out_by_fallback = true;
        assert_eq!(classify(&obs, &constraints()), Verdict::Tle);
    }

    #[test]
    fn mle_from_oom_kill() {
        let mut obs = base_observation();
        obs.exit_code = 137;
        obs.stats.memory_events = MemoryEvents {
            oom_kill: 1,
            ..Default::default()
        };
        assert_eq!(classify(&obs, &constraints()), Verdict::Mle);
    }

    #[test]
    fn mle_from_peak_at_limit() {
        let mut obs = base_observation();
        obs.stats.memory_peak = constraints().memory_limit_bytes();
        assert_eq!(classify(&obs, &constraints()), Verdict::Mle);
    }

    #[test]
    fn runtime_error_sigsegv() {
        let mut obs = base_observation();
        obs.exit_code = 139; // 128 + SIGSEGV(11)
        assert_eq!(classify(&obs, &constraints()), Verdict::Re);
    }

    #[test]
    fn ile_idle_sleep() {
        let mut obs = base_observation();
        obs.wall_time_s = 1.0;
        obs.stats.cpu_stat = CpuStat {
            usage_usec: 500,
            ..Default::default()
        };
        assert_eq!(classify(&obs, &constraints()), Verdict::Ile);
    }

    #[test]
    fn output_limit_exceeded() {
        let mut obs = base_observation();
        obs.output_bytes = 11 * 1024 * 1024;
        assert_eq!(classify(&obs, &constraints()), Verdict::Ole);
    }

    #[test]
    fn judgement_error_when_comparator_never_ran() {
        let mut obs = base_observation();
        obs.compare_result = None;
        assert_eq!(classify(&obs, &constraints()), Verdict::Je);
    }

    #[test]
    fn termination_decoding_distinguishes_kill_from_crash() {
        assert_eq!(Termination::from_shell_status(0), Termination::Exited(0));
        assert_eq!(Termination::from_shell_status(137), Termination::Killed);
        assert_eq!(
            Termination::from_shell_status(139),
            Termination::Crashed(139)
        );
    }
}
