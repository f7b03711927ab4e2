//! Per-stage view of the execution context.

use std::path::{Path, PathBuf};

use super::ExecutionContext;
use crate::errors::ExecutionError;
use crate::members::{DomainObject, MemberValues, Value};

/// What a stage sees while it executes: its bound inputs, an output slot,
/// and the shared run context.
pub struct StageContext<'a> {
    stage: &'a str,
    inputs: &'a MemberValues,
    outputs: MemberValues,
    run: &'a ExecutionContext,
}

impl<'a> StageContext<'a> {
    /// Creates a stage context.
    #[must_use]
    pub fn new(stage: &'a str, inputs: &'a MemberValues, run: &'a ExecutionContext) -> Self {
        Self {
            stage,
            inputs,
            outputs: MemberValues::new(),
            run,
        }
    }

    /// The executing stage's name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        self.stage
    }

    /// All bound inputs.
    #[must_use]
    pub fn inputs(&self) -> &MemberValues {
        self.inputs
    }

    /// One input value.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    /// A required string input.
    pub fn require_str(&self, name: &str) -> Result<&str, ExecutionError> {
        self.inputs
            .get_str(name)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| self.fail(format!("no {name} specified")))
    }

    /// A required domain object input.
    pub fn require_object(&self, name: &str) -> Result<&DomainObject, ExecutionError> {
        self.inputs
            .get_object(name)
            .ok_or_else(|| self.fail(format!("no {name} given")))
    }

    /// Sets an output value.
    pub fn set_output(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.outputs.set(name, value);
    }

    /// Outputs set so far.
    #[must_use]
    pub fn outputs(&self) -> &MemberValues {
        &self.outputs
    }

    /// Consumes the context, returning the outputs.
    #[must_use]
    pub fn into_outputs(self) -> MemberValues {
        self.outputs
    }

    /// Writes to the run log.
    pub fn log(&self, message: &str) {
        self.run.log(message, 0);
    }

    /// Writes stage output text, shown even when the run log is off.
    pub fn print(&self, text: &str) {
        self.run.write_text(text);
        self.run.write_text("\n");
    }

    /// Reports a non-fatal warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.run.diagnostics().warning(self.stage, message);
    }

    /// Prompts for a line on the context's input stream.
    pub fn prompt(&self, prompt: &str) -> Option<String> {
        self.run.read_line(prompt)
    }

    /// The last path any stage of the run visited.
    #[must_use]
    pub fn last_visited_path(&self) -> PathBuf {
        self.run.last_visited_path()
    }

    /// Records a visited path.
    pub fn visit(&self, path: &Path) {
        self.run.set_last_visited_path(path);
    }

    /// Builds an execution error attributed to this stage.
    #[must_use]
    pub fn fail(&self, message: impl Into<String>) -> ExecutionError {
        ExecutionError::new(self.stage, message)
    }
}

impl std::fmt::Debug for StageContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("stage", &self.stage)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BufferSink;
    use std::sync::Arc;

    #[test]
    fn test_require_str_rejects_empty() {
        let run = ExecutionContext::new();
        let mut inputs = MemberValues::new();
        inputs.set("InputFileName", "");
        let ctx = StageContext::new("textreader", &inputs, &run);

        let err = ctx.require_str("InputFileName").unwrap_err();
        assert_eq!(err.stage, "textreader");
        assert!(err.message.contains("InputFileName"));
    }

    #[test]
    fn test_outputs_collected() {
        let run = ExecutionContext::new();
        let inputs = MemberValues::new();
        let mut ctx = StageContext::new("textstats", &inputs, &run);

        ctx.set_output("Lines", 3);
        let outputs = ctx.into_outputs();

        assert_eq!(outputs.get_int("Lines"), Some(3));
    }

    #[test]
    fn test_print_ignores_log_switch() {
        let sink = BufferSink::new();
        let run = ExecutionContext::new()
            .with_output(Arc::new(sink.clone()))
            .with_log(false);
        let inputs = MemberValues::new();
        let ctx = StageContext::new("echo", &inputs, &run);

        ctx.log("not shown");
        ctx.print("hello");

        assert_eq!(sink.contents(), "hello\n");
    }
}
