//! Test assertions for run results.

use crate::members::Value;
use crate::pipeline::{RunResult, StageStatus};

/// Asserts that the run recorded no failures.
pub fn assert_run_succeeded(result: &RunResult) {
    assert!(
        result.success(),
        "Expected a clean run, got failures: {:?}",
        result.failures
    );
}

/// Asserts that the last record of `stage` has the expected status.
pub fn assert_stage_status(result: &RunResult, stage: &str, expected: StageStatus) {
    let actual = result.record(stage).map(|r| r.status);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stage '{}' to be {:?}, got {:?}",
        stage,
        expected,
        actual
    );
}

/// Asserts that `stage` completed.
pub fn assert_stage_completed(result: &RunResult, stage: &str) {
    assert_stage_status(result, stage, StageStatus::Completed);
}

/// Asserts that `stage` failed.
pub fn assert_stage_failed(result: &RunResult, stage: &str) {
    assert_stage_status(result, stage, StageStatus::Failed);
}

/// Asserts that `stage` produced `member` with the expected value.
pub fn assert_output_value(result: &RunResult, stage: &str, member: &str, expected: &Value) {
    let actual = result.outputs_of(stage).and_then(|o| o.get(member));
    assert_eq!(
        actual,
        Some(expected),
        "Expected {}.{} = {:?}, got {:?}",
        stage,
        member,
        expected,
        actual
    );
}
