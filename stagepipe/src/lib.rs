//! # Stagepipe
//!
//! A pipeline engine for chains of typed processing stages.
//!
//! Stagepipe turns a flat, shell-like command into an ordered chain of
//! stage invocations and runs it, with support for:
//!
//! - **Typed members**: every stage declares its inputs and outputs with type, arity and constraints
//! - **Binding**: raw command-line tokens are checked and converted before a stage runs
//! - **Piping**: outputs flow into the next stages' inputs implicitly by name and type, or explicitly by `@stage-id.option`
//! - **Execution server**: a FIFO queue of chains served by a long-running loop
//! - **Batch fan-out**: one stage run per entry of a directory
//! - **Wrapper generation**: an XML parameter descriptor and a shell stub for an annotated chain
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagepipe::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(StageRegistry::with_builtins());
//! let runner = ChainRunner::new(registry, ExecutionContext::new());
//!
//! let result = runner.run_command("textreader -ifile in.txt --pipe textstats")?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod batch;
pub mod context;
pub mod errors;
pub mod events;
pub mod members;
pub mod pipeline;
pub mod server;
pub mod stages;
pub mod testing;
pub mod wrapper;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::batch::{BatchRunner, BatchSummary};
    pub use crate::context::{
        BufferSink, ExecutionContext, RunnerOptions, StageContext, StdoutSink, TextSink,
    };
    pub use crate::errors::{
        ExecutionError, MemberBindingError, MultiplicityError, PypeError, TokenizeError,
        UnknownStageError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::members::{
        Arity, Constraint, DomainObject, MemberDescriptor, MemberValues, TypeTag, Value,
    };
    pub use crate::pipeline::{
        tokenize, ChainRunner, PipelineSpec, RunResult, StageDescriptor, StageStatus,
        PIPE_SEPARATOR,
    };
    pub use crate::server::{work_queue, ExecutionServer, QueueItem, ServerConfig, StopToken};
    pub use crate::stages::{FnStage, Stage, StageRegistry};
    pub use crate::wrapper::{GeneratedWrapper, WrapperGenerator, WrapperOptions};
}
