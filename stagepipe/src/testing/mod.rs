//! Testing utilities for stagepipe chains.
//!
//! This module provides:
//! - Mock stages that record, fail or panic
//! - A harness wiring a registry to in-memory sinks
//! - Assertions over run results

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_output_value, assert_run_succeeded, assert_stage_completed, assert_stage_failed,
    assert_stage_status,
};
pub use fixtures::TestHarness;
pub use mocks::{
    register_failing_stage, register_panicking_stage, register_recording_stage, CallLog,
};
