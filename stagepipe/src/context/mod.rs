//! Context management for chain execution.
//!
//! This module provides:
//! - The shared [`ExecutionContext`] of a run and its [`RunnerOptions`]
//! - The per-stage [`StageContext`] handed to `Stage::execute`
//! - Text sinks for the run log and the diagnostic channel

mod diagnostics;
mod execution;
mod sink;
mod stage;

pub use diagnostics::{
    Diagnostic, DiagnosticChannel, DiagnosticLevel, DiagnosticListener, ListenerGuard,
    SinkListener,
};
pub use execution::{ExecutionContext, RunnerOptions};
pub use sink::{BufferSink, NullSink, StderrSink, StdoutSink, TextSink};
pub use stage::StageContext;
