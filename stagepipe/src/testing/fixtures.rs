//! Test fixtures for chain runs.

use std::sync::Arc;

use crate::context::{BufferSink, ExecutionContext, RunnerOptions};
use crate::errors::PypeError;
use crate::events::CollectingEventSink;
use crate::pipeline::{ChainRunner, RunResult};
use crate::stages::StageRegistry;

/// A registry plus in-memory sinks, ready to run commands.
#[derive(Debug)]
pub struct TestHarness {
    /// The registry stages are resolved from.
    pub registry: Arc<StageRegistry>,
    /// Captures the run log.
    pub output: BufferSink,
    /// Captures lifecycle events.
    pub events: Arc<CollectingEventSink>,
    /// Options for the next run.
    pub options: RunnerOptions,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Creates a harness with the built-in stages.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(StageRegistry::with_builtins())
    }

    /// Creates a harness around an existing registry.
    #[must_use]
    pub fn with_registry(registry: StageRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            output: BufferSink::new(),
            events: Arc::new(CollectingEventSink::new()),
            options: RunnerOptions::default(),
        }
    }

    /// Sets the runner options.
    #[must_use]
    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds a chain runner wired to the harness sinks.
    #[must_use]
    pub fn runner(&self) -> ChainRunner {
        let ctx = ExecutionContext::new()
            .with_options(self.options.clone())
            .with_output(Arc::new(self.output.clone()))
            .with_event_sink(self.events.clone());
        ChainRunner::new(Arc::clone(&self.registry), ctx)
    }

    /// Runs a command string.
    pub fn run(&self, command: &str) -> Result<RunResult, PypeError> {
        self.runner().run_command(command)
    }
}
