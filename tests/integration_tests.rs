//! End-to-end tests for the judging engine's public API.
//!
//! Most of these run entirely in `dry_run` mode: no Docker daemon or
//! cgroup v2 filesystem is required, since every external call is
//! short-circuited by the Command Shim / Container Controller's dry-run
//! paths. They exercise discovery, ordering, verdict classification glue,
//! and the `Session` iterator protocol itself, rather than a real
//! container lifecycle (kernel-dependent scenarios still need a live host;
//! see `SPEC_FULL.md` §8).

use std::fs;
use std::path::Path;

use futures::StreamExt;
use judge_engine::verdict::{classify, CompareResult, Observation, Termination};
use judge_engine::{CommandHooks, Constraints, SessionConfig, Stats};

fn constraints() -> Constraints {
    Constraints {
        time_limit_s: 2,
        memory_limit_mb: 256,
        memory_swap_limit_mb: 0,
        cpu_quota: 2_000_000,
        cpu_period: 1_000_000,
    }
}

fn write_fixture(dir: &Path, n: u32) {
    fs::create_dir_all(dir.join("input")).unwrap();
    fs::create_dir_all(dir.join("output")).unwrap();
    for i in 1..=n {
        fs::write(dir.join("input").join(format!("input{i}.txt")), format!("{i}\n")).unwrap();
        fs::write(dir.join("output").join(format!("output{i}.txt")), format!("{i}\n")).unwrap();
    }
}

#[test]
fn discovery_pairs_every_input_with_its_expected_output() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), 4);

    let cases = judge_engine::discovery::discover(dir.path(), "input", "output").unwrap();
    assert_eq!(cases.len(), 4);
    for case in &cases {
        assert!(case.expected_output_path.is_some());
    }
}

#[test]
fn shuffled_order_is_deterministic_for_a_fixed_seed() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), 10);

    let cases_a = judge_engine::discovery::discover(dir.path(), "input", "output").unwrap();
    let cases_b = judge_engine::discovery::discover(dir.path(), "input", "output").unwrap();

    let ordered_a = judge_engine::discovery::order(cases_a, true, 7);
    let ordered_b = judge_engine::discovery::order(cases_b, true, 7);

    let indices_a: Vec<u32> = ordered_a.iter().map(|c| c.index).collect();
    let indices_b: Vec<u32> = ordered_b.iter().map(|c| c.index).collect();
    assert_eq!(indices_a, indices_b);
}

#[test]
fn accepted_requires_matching_output_within_limits() {
    let obs = Observation {
        exit_code: 0,
        timed_out_by_fallback: false,
        stats: Stats::default(),
        wall_time_s: 0.2,
        output_bytes: 2,
        expected_bytes: 2,
        output_limit_bytes: None,
        compare_result: Some(CompareResult::Match),
    };
    assert_eq!(classify(&obs, &constraints()), judge_engine::Verdict::Ac);
}

#[test]
fn sigkill_without_oom_counters_is_tle_not_mle() {
    let obs = Observation {
        exit_code: 137,
        timed_out_by_fallback: false,
        stats: Stats::default(),
        wall_time_s: 2.5,
        output_bytes: 0,
        expected_bytes: 2,
        output_limit_bytes: None,
        compare_result: None,
    };
    assert_eq!(
        Termination::from_shell_status(obs.exit_code),
        Termination::Killed
    );
    assert_eq!(classify(&obs, &constraints()), judge_engine::Verdict::Tle);
}

struct EchoHooks;

impl CommandHooks for EchoHooks {
    fn compile_command(&self, _work_dir: &Path) -> String {
        String::new()
    }
    fn run_command(&self, work_dir: &Path) -> String {
        format!("{}/a.out", work_dir.display())
    }
}

#[tokio::test]
async fn dry_run_session_yields_one_result_per_test_case_without_a_daemon() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), 3);

    let config = SessionConfig {
        docker_image: "alpine:3.18".to_string(),
        container_user: "root".to_string(),
        non_root_user: "judge".to_string(),
        host_src_dir: dir.path().to_path_buf(),
        container_work_dir: "/app".into(),
        container_name: None,
        constraints: constraints(),
        disable_compile: true,
        lazy_container: false,
        early_exit: false,
        dry_run: true,
        volume: None,
    };

    let mut session = judge_engine::Session::new(config, Box::new(EchoHooks))
        .await
        .unwrap();

    let results: Vec<_> = session
        .run("input", "output", false, 0)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(results.len(), 3);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.test_case, i as u32 + 1);
    }

    session.teardown().await.unwrap();
}

#[test]
fn command_shim_dry_run_never_touches_the_filesystem() {
    let shim = judge_engine::shim::CommandShim::new(true);
    let fut = shim.exec(
        &["rm".to_string(), "-rf".to_string(), "/nonexistent".to_string()],
        None,
        None,
    );
    let out = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
        .unwrap();
    assert_eq!(out.exit_code, 0);
}
