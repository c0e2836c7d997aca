//! Result Iterator (C9 — spec.md §4.9).
//!
//! [`Session`] is the crate's only public entry point: it owns the
//! container for one judging run and yields a [`TestResult`] per
//! discovered test case, lazily, as a [`Stream`]. There is no Python
//! `with`-style context manager in Rust, so teardown is an explicit async
//! method instead (see `DESIGN.md`).
//!
//! `config.dry_run` propagates down through [`ContainerController`] and
//! [`CgroupManager`]: no Docker daemon or cgroup v2 filesystem is touched,
//! every exec returns a synthesized placeholder, and the session still
//! yields one `TestResult` per discovered test case (spec.md §6, §9).

use std::collections::VecDeque;

use futures::stream::{self, Stream};
use tracing::{info, instrument, warn};

use crate::cgroup::CgroupManager;
use crate::comparator::Comparator;
use crate::compile::{self, CompileOutcome};
use crate::container::ContainerController;
use crate::discovery;
use crate::error::Result;
use crate::run;
use crate::types::{CommandHooks, SessionConfig, Stats, TestCase, TestResult};
use crate::verdict::{classify, CompareResult, Observation, Verdict};

/// A single judging session: one container, one compile attempt, many
/// test-case runs (spec.md §4.9).
pub struct Session {
    container: ContainerController,
    config: SessionConfig,
    hooks: Box<dyn CommandHooks>,
    comparator: Comparator,
    prepared: bool,
    torn_down: bool,
}

impl Session {
    /// Connect to the container runtime and, unless `config.lazy_container`
    /// is set, create the container and prepare its parent cgroup up front.
    #[instrument(skip(config, hooks))]
    pub async fn new(config: SessionConfig, hooks: Box<dyn CommandHooks>) -> Result<Self> {
        let mut container = ContainerController::new(config.clone())?;
        container.ensure_daemon().await?;

        let prepared = if config.lazy_container {
            false
        } else {
            container.create().await?;
            CgroupManager::prepare(&container).await?;
            true
        };

        Ok(Self {
            container,
            config,
            hooks,
            comparator: Comparator::Byte,
            prepared,
            torn_down: false,
        })
    }

    /// Use an external checker binary instead of the default byte comparator.
    #[must_use]
    pub fn with_checker(mut self, checker_path: std::path::PathBuf) -> Self {
        self.comparator = Comparator::Checker(checker_path);
        self
    }

    async fn ensure_prepared(&mut self) -> Result<()> {
        if !self.prepared {
            self.container.create().await?;
            CgroupManager::prepare(&self.container).await?;
            self.prepared = true;
        }
        Ok(())
    }

    /// Discover test cases under `host_src_dir`, compile once, and return a
    /// lazy stream of [`TestResult`] — one per test case, in `order`
    /// (spec.md §4.9 "lazy yield"). Honors `early_exit`: once a non-`AC`
    /// verdict is yielded with `early_exit` set, the stream ends after that
    /// item (spec.md §4.9 invariant 5; the in-flight test always finishes
    /// its own stats read before the stream stops).
    #[instrument(skip(self))]
    pub async fn run(
        &mut self,
        input_prefix: &str,
        output_prefix: &str,
        shuffle: bool,
        seed: u64,
    ) -> Result<impl Stream<Item = TestResult> + '_> {
        self.ensure_prepared().await?;

        let cases = discovery::discover(&self.config.host_src_dir, input_prefix, output_prefix)?;
        let cases = discovery::order(cases, shuffle, seed);

        let compile_outcome = compile::compile(&self.container, &self.config, self.hooks.as_ref()).await?;
        let compile_failure = match compile_outcome {
            CompileOutcome::Failed { output } => Some(output),
            CompileOutcome::Success | CompileOutcome::Skipped => None,
        };

        let state = RunState {
            session: self,
            cases: cases.into_iter().collect(),
            compile_failure,
            input_prefix: input_prefix.to_string(),
            stopped: false,
        };

        Ok(stream::unfold(state, |mut state| async move {
            if state.stopped {
                return None;
            }
            let test = state.cases.pop_front()?;
            let result = state
                .session
                .judge_one(&test, state.compile_failure.as_deref(), &state.input_prefix)
                .await;
            if state.session.config.early_exit && result.verdict != Verdict::Ac {
                state.stopped = true;
            }
            Some((result, state))
        }))
    }

    /// Produce the result for one test case: a `CE` verdict fanned out from
    /// a prior compile failure, or a real run + classification (spec.md
    /// §4.4/§8 invariant 4 — every test case is `CE` once compilation
    /// fails, none of them actually run).
    async fn judge_one(
        &mut self,
        test: &TestCase,
        compile_failure: Option<&str>,
        input_prefix: &str,
    ) -> TestResult {
        if let Some(output) = compile_failure {
            return TestResult {
                test_case: test.index,
                exit_code: -1,
                stats: Stats::default(),
                verdict: Verdict::Ce,
                verdict_label: Verdict::Ce.label().to_string(),
                verdict_details: output.to_string(),
                input: String::new(),
                actual_output: String::new(),
                expected_output: String::new(),
            };
        }

        match self.run_and_classify(test, input_prefix).await {
            Ok(result) => result,
            Err(e) => {
                warn!(test = test.index, error = %e, "per-test infrastructure failure");
                TestResult {
                    test_case: test.index,
                    exit_code: -1,
                    stats: Stats::default(),
                    verdict: Verdict::Je,
                    verdict_label: Verdict::Je.label().to_string(),
                    verdict_details: e.to_string(),
                    input: String::new(),
                    actual_output: String::new(),
                    expected_output: String::new(),
                }
            }
        }
    }

    async fn run_and_classify(&mut self, test: &TestCase, input_prefix: &str) -> Result<TestResult> {
        let observed = run::run_test(
            &self.container,
            &self.config,
            self.hooks.as_ref(),
            test,
            input_prefix,
            None,
        )
        .await?;

        let actual_output =
            run::resolve_actual_output(&self.config.host_src_dir, test.index, &observed.stdout).await?;

        let expected_output = match &test.expected_output_path {
            Some(path) => tokio::fs::read_to_string(path).await?,
            None => String::new(),
        };

        // No expected output discovered: the comparator can never run, so
        // fall through to `classify`'s `None`-compare-result `JE` fallback
        // rather than special-casing it here.
        let compare_result = match &test.expected_output_path {
            Some(expected_path) => {
                Some(self.compare(test, &actual_output, expected_path).await?)
            }
            None => None,
        };

        let Some(stats) = observed.stats else {
            return Ok(TestResult {
                test_case: test.index,
                exit_code: observed.exit_code,
                stats: Stats::default(),
                verdict: Verdict::Je,
                verdict_label: Verdict::Je.label().to_string(),
                verdict_details: "resource counters could not be read".to_string(),
                input: observed.input,
                actual_output,
                expected_output,
            });
        };

        let observation = Observation {
            exit_code: observed.exit_code,
            timed_out_by_fallback: observed.timed_out_by_fallback,
            stats,
            wall_time_s: observed.wall_time_s,
            output_bytes: actual_output.len(),
            expected_bytes: expected_output.len(),
            output_limit_bytes: None,
            compare_result,
        };

        let verdict = classify(&observation, &self.config.constraints);

        info!(test = test.index, verdict = %verdict, "test classified");

        Ok(TestResult {
            test_case: test.index,
            exit_code: observed.exit_code,
            stats,
            verdict,
            verdict_label: verdict.label().to_string(),
            verdict_details: verdict.default_details().to_string(),
            input: observed.input,
            actual_output,
            expected_output,
        })
    }

    /// Compare `actual` against the file at `expected_path`. The `Byte`
    /// comparator runs in memory; the `Checker` comparator needs both
    /// sides on disk, so `actual` is staged into a scratch file first.
    async fn compare(
        &self,
        test: &TestCase,
        actual: &str,
        expected_path: &std::path::Path,
    ) -> Result<CompareResult> {
        match &self.comparator {
            Comparator::Byte => {
                let expected = tokio::fs::read_to_string(expected_path).await?;
                Ok(Comparator::compare_bytes(actual, &expected))
            }
            checker @ Comparator::Checker(_) => {
                let actual_path = self
                    .config
                    .host_src_dir
                    .join("actual_output")
                    .join(format!("{}.txt", test.index));
                if tokio::fs::metadata(&actual_path).await.is_err() {
                    if let Some(parent) = actual_path.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(&actual_path, actual).await?;
                }
                checker
                    .compare_files(&test.input_path, &actual_path, expected_path)
                    .await
            }
        }
    }

    /// Best-effort, idempotent teardown: stops and removes the container.
    /// Safe to call more than once, and safe to skip (a dropped `Session`
    /// simply leaks its container, matching spec.md §9's explicit-teardown
    /// design note — see `DESIGN.md`).
    #[instrument(skip(self))]
    pub async fn teardown(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.container.stop().await?;
        self.torn_down = true;
        Ok(())
    }
}

struct RunState<'a> {
    session: &'a mut Session,
    cases: VecDeque<TestCase>,
    compile_failure: Option<String>,
    input_prefix: String,
    stopped: bool,
}
