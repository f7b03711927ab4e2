//! Mock stages for testing.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::members::{MemberDescriptor, TypeTag, Value};
use crate::stages::StageRegistry;

/// A shared, ordered log of stage invocations.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns a copy of all entries.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Registers a stage that logs `name:<Tag>` on every run and outputs its tag.
///
/// The stage has a single string input `Tag` (`-tag`) and a string output
/// `Tag`, so consecutive recording stages pipe into each other.
pub fn register_recording_stage(registry: &StageRegistry, name: &str, log: &CallLog) {
    let log = log.clone();
    let stage_name = name.to_string();
    registry.register_fn(
        name,
        vec![MemberDescriptor::new("Tag", "tag", TypeTag::Str).with_default("")],
        vec![MemberDescriptor::new("Tag", "tag", TypeTag::Str)],
        move |ctx| {
            let tag = ctx.inputs().get_str("Tag").unwrap_or_default().to_string();
            log.push(format!("{stage_name}:{tag}"));
            ctx.set_output("Tag", Value::Str(tag));
            Ok(())
        },
    );
}

/// Registers a stage whose `execute` always fails with `message`.
pub fn register_failing_stage(registry: &StageRegistry, name: &str, message: &str) {
    let message = message.to_string();
    registry.register_fn(name, Vec::new(), Vec::new(), move |ctx| {
        Err(ctx.fail(message.clone()))
    });
}

/// Registers a stage whose `execute` panics.
pub fn register_panicking_stage(registry: &StageRegistry, name: &str) {
    registry.register_fn(name, Vec::new(), Vec::new(), |_| {
        panic!("stage panicked on purpose")
    });
}
