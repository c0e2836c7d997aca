//! Test Discovery & Ordering (C5 — spec.md §4.5).

use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::types::TestCase;

/// Enumerate `<src>/input/<prefix><i>.txt` for `i = 1..=count` and pair each
/// with `<src>/output/<prefix><i>.txt`, where `count` is the number of
/// entries in the input directory (spec.md §3 "TestCase", §4.5).
///
/// If an expected-output file is missing for an index the input directory
/// provides, `expected_output_path` is `None` — the run stage converts that
/// into a `JE` verdict for that index rather than failing discovery itself.
#[instrument(skip(src_dir))]
pub fn discover(src_dir: &Path, input_prefix: &str, output_prefix: &str) -> Result<Vec<TestCase>> {
    let input_dir = src_dir.join("input");
    let output_dir = src_dir.join("output");

    let count = std::fs::read_dir(&input_dir)?.count() as u32;
    debug!(count, "discovered test cases");

    let mut cases = Vec::with_capacity(count as usize);
    for index in 1..=count {
        let input_path = input_dir.join(format!("{input_prefix}{index}.txt"));
        let expected_output_path = output_dir.join(format!("{output_prefix}{index}.txt"));
        let expected_output_path = expected_output_path.exists().then_some(expected_output_path);
        cases.push(TestCase {
            index,
            input_path,
            expected_output_path,
        });
    }
    Ok(cases)
}

/// Produce the iteration order over discovered test cases. With
/// `shuffle = false` this is the identity order (`1..=N`); with
/// `shuffle = true` it is a pseudo-random permutation. Either way, the
/// `index` carried by each [`TestCase`] is unchanged — shuffle reorders
/// execution, it never relabels a test (spec.md §4.5).
#[must_use]
pub fn order(mut cases: Vec<TestCase>, shuffle: bool, seed: u64) -> Vec<TestCase> {
    if shuffle {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        cases.shuffle(&mut rng);
    }
    cases
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_fixture(dir: &tempfile::TempDir, n: u32, missing_output: Option<u32>) {
        fs::create_dir_all(dir.path().join("input")).unwrap();
        fs::create_dir_all(dir.path().join("output")).unwrap();
        for i in 1..=n {
            fs::write(dir.path().join("input").join(format!("input{i}.txt")), "1\n").unwrap();
            if Some(i) != missing_output {
                fs::write(
                    dir.path().join("output").join(format!("output{i}.txt")),
                    "1\n",
                )
                .unwrap();
            }
        }
    }

    #[test]
    fn discovers_all_cases_with_matching_outputs() {
        let dir = tempfile::tempdir().unwrap();
        make_fixture(&dir, 3, None);
        let cases = discover(dir.path(), "input", "output").unwrap();
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].index, 1);
        assert!(cases.iter().all(|c| c.expected_output_path.is_some()));
    }

    #[test]
    fn missing_expected_output_is_reported_as_none_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        make_fixture(&dir, 3, Some(2));
        let cases = discover(dir.path(), "input", "output").unwrap();
        assert!(cases[1].expected_output_path.is_none());
        assert!(cases[0].expected_output_path.is_some());
        assert!(cases[2].expected_output_path.is_some());
    }

    #[test]
    fn shuffle_reorders_but_preserves_original_indices() {
        let dir = tempfile::tempdir().unwrap();
        make_fixture(&dir, 20, None);
        let cases = discover(dir.path(), "input", "output").unwrap();
        let mut indices: Vec<u32> = cases.iter().map(|c| c.index).collect();
        let shuffled = order(cases, true, 42);
        let mut shuffled_indices: Vec<u32> = shuffled.iter().map(|c| c.index).collect();
        indices.sort_unstable();
        shuffled_indices.sort_unstable();
        assert_eq!(indices, shuffled_indices);
    }

    #[test]
    fn no_shuffle_preserves_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        make_fixture(&dir, 5, None);
        let cases = discover(dir.path(), "input", "output").unwrap();
        let ordered = order(cases, false, 0);
        let indices: Vec<u32> = ordered.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
    }
}
