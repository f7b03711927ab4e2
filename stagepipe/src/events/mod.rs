//! Lifecycle events for observability.
//!
//! The chain runner emits `stage.started`, `stage.completed`, `stage.failed`,
//! `stage.skipped` and `pipeline.completed`; the execution server adds
//! `queue.item.started` and `queue.item.completed`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};
