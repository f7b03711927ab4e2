//! Stage trait and implementations.
//!
//! A stage declares a typed parameter interface (its input and output
//! members) and a single synchronous `execute` entry point. Stages are
//! created fresh for every invocation by the [`StageRegistry`].

pub mod builtin;
mod registry;
pub mod usage;

pub use registry::{StageFactory, StageRegistry};

use std::fmt::Debug;
use std::sync::Arc;

use crate::context::StageContext;
use crate::errors::ExecutionError;
use crate::members::MemberDescriptor;

/// Trait for pipeline stages.
pub trait Stage: Send + Debug {
    /// Returns the stage name.
    fn name(&self) -> &str;

    /// One-paragraph description used in usage text.
    fn doc(&self) -> &str {
        ""
    }

    /// Declared inputs, without the built-in `Id` and `Disabled` members.
    fn input_members(&self) -> Vec<MemberDescriptor>;

    /// Declared outputs.
    fn output_members(&self) -> Vec<MemberDescriptor>;

    /// Runs the stage on its bound inputs.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Bound inputs, the output slot and the shared run context
    fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), ExecutionError>;
}

/// The body of a [`FnStage`].
pub type StageFn = Arc<dyn Fn(&mut StageContext<'_>) -> Result<(), ExecutionError> + Send + Sync>;

/// A stage built from member lists and a closure.
#[derive(Clone)]
pub struct FnStage {
    name: String,
    doc: String,
    inputs: Vec<MemberDescriptor>,
    outputs: Vec<MemberDescriptor>,
    func: StageFn,
}

impl FnStage {
    /// Creates a new function-based stage.
    pub fn new<F>(
        name: impl Into<String>,
        inputs: Vec<MemberDescriptor>,
        outputs: Vec<MemberDescriptor>,
        func: F,
    ) -> Self
    where
        F: Fn(&mut StageContext<'_>) -> Result<(), ExecutionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            doc: String::new(),
            inputs,
            outputs,
            func: Arc::new(func),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }
}

impl Debug for FnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

impl Stage for FnStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn doc(&self) -> &str {
        &self.doc
    }

    fn input_members(&self) -> Vec<MemberDescriptor> {
        self.inputs.clone()
    }

    fn output_members(&self) -> Vec<MemberDescriptor> {
        self.outputs.clone()
    }

    fn execute(&mut self, ctx: &mut StageContext<'_>) -> Result<(), ExecutionError> {
        (self.func)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::members::{MemberValues, TypeTag};

    #[test]
    fn test_fn_stage_executes_closure() {
        let mut stage = FnStage::new(
            "double",
            vec![MemberDescriptor::new("Value", "value", TypeTag::Int)],
            vec![MemberDescriptor::new("Result", "result", TypeTag::Int)],
            |ctx| {
                let value = ctx.inputs().get_int("Value").unwrap_or(0);
                ctx.set_output("Result", value * 2);
                Ok(())
            },
        );

        let run = ExecutionContext::new();
        let mut inputs = MemberValues::new();
        inputs.set("Value", 21);
        let mut ctx = StageContext::new("double", &inputs, &run);

        stage.execute(&mut ctx).unwrap();

        assert_eq!(ctx.outputs().get_int("Result"), Some(42));
        assert_eq!(stage.name(), "double");
        assert_eq!(stage.input_members().len(), 1);
    }
}
