//! Pipeline parsing and execution.
//!
//! This module provides:
//! - Stage and pipeline descriptors
//! - The tokenizer splitting flat commands at `--pipe`
//! - The binder mapping raw tokens onto typed members
//! - The chain runner executing stages in order

mod binder;
mod result;
mod runner;
mod spec;
mod tokenizer;

pub use binder::{bind, is_flag, BoundStage, ExplicitPipe, PipeRef};
pub use result::{FailureRecord, RunResult, StageRecord, StageStatus};
pub use runner::ChainRunner;
pub use spec::{
    stage_name, PipelineSpec, StageDescriptor, SyntheticLink, FILE_PLACEHOLDER, PIPE_SEPARATOR,
    READER_FILE_OPTION, WRITER_FILE_OPTION,
};
pub use tokenizer::{join_command, split_command, tokenize, PipeOptions};
