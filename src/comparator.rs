//! Output comparison (C8 — spec.md §4.8).

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::{JudgeError, Result};
use crate::verdict::CompareResult;

/// Compares actual output to expected output, either byte-wise or by
/// delegating to an external checker binary.
#[derive(Debug, Clone)]
pub enum Comparator {
    /// Strip trailing whitespace per line and trailing newlines, then
    /// compare (spec.md §4.8 "Default (byte)").
    Byte,
    /// Invoke `checker <input> <actual> <expected>`; exit 0 means match.
    Checker(std::path::PathBuf),
}

impl Comparator {
    /// Compare two in-memory strings using the default byte comparator.
    /// `compare(x, x)` is guaranteed to be `Match` (spec.md §8 symmetry
    /// invariant).
    #[must_use]
    pub fn compare_bytes(actual: &str, expected: &str) -> CompareResult {
        if normalize(actual) == normalize(expected) {
            CompareResult::Match
        } else {
            CompareResult::Mismatch
        }
    }

    /// Run the comparator against files on disk.
    #[instrument(skip(self))]
    pub async fn compare_files(
        &self,
        input_path: &Path,
        actual_path: &Path,
        expected_path: &Path,
    ) -> Result<CompareResult> {
        match self {
            Self::Byte => {
                let actual = tokio::fs::read_to_string(actual_path).await?;
                let expected = tokio::fs::read_to_string(expected_path).await?;
                Ok(Self::compare_bytes(&actual, &expected))
            }
            Self::Checker(checker_path) => {
                let output = Command::new(checker_path)
                    .arg(input_path)
                    .arg(actual_path)
                    .arg(expected_path)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .output()
                    .await
                    .map_err(|e| JudgeError::Cmd(format!("checker invocation failed: {e}")))?;

                debug!(status = ?output.status, "checker exited");
                if output.status.success() {
                    Ok(CompareResult::Match)
                } else {
                    Ok(CompareResult::Mismatch)
                }
            }
        }
    }
}

fn normalize(text: &str) -> String {
    text.trim_end_matches(['\n', '\r'])
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_compare_ignores_trailing_whitespace() {
        assert_eq!(
            Comparator::compare_bytes("hello \n world  \n", "hello\n world\n"),
            CompareResult::Match
        );
    }

    #[test]
    fn byte_compare_ignores_trailing_newlines() {
        assert_eq!(
            Comparator::compare_bytes("hello\n", "hello\n\n\n"),
            CompareResult::Match
        );
    }

    #[test]
    fn byte_compare_detects_mismatch() {
        assert_eq!(
            Comparator::compare_bytes("hello", "Hello"),
            CompareResult::Mismatch
        );
    }

    #[test]
    fn compare_is_symmetric_on_equal_inputs() {
        let text = "42\n1 2 3\n";
        assert_eq!(Comparator::compare_bytes(text, text), CompareResult::Match);
    }
}
