//! Engine warnings and errors raised while a stage executes.
//!
//! Stages report non-fatal problems through a [`DiagnosticChannel`] instead
//! of failing. Listeners registered on the channel receive every diagnostic;
//! registration returns a [`ListenerGuard`] that unregisters on drop.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

use super::TextSink;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    /// Something looked wrong but the stage carried on.
    Warning,
    /// The engine reported an error; the stage may still have produced output.
    Error,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "Warning"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// One warning or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity.
    pub level: DiagnosticLevel,
    /// Reporting stage.
    pub stage: String,
    /// Message text.
    pub message: String,
    /// When it was reported.
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [{}] {}", self.level, self.stage, self.message)
    }
}

/// Receives diagnostics.
pub trait DiagnosticListener: Send + Sync {
    /// Called once per diagnostic.
    fn on_diagnostic(&self, diagnostic: &Diagnostic);
}

/// Appends each diagnostic as a line to a text sink.
pub struct SinkListener {
    sink: Arc<dyn TextSink>,
}

impl SinkListener {
    /// Creates a listener writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn TextSink>) -> Self {
        Self { sink }
    }
}

impl DiagnosticListener for SinkListener {
    fn on_diagnostic(&self, diagnostic: &Diagnostic) {
        self.sink.write_text(&format!("{diagnostic}\n"));
    }
}

type ListenerList = RwLock<Vec<(u64, Arc<dyn DiagnosticListener>)>>;

/// Fan-out point for diagnostics. Clones share listeners.
#[derive(Clone, Default)]
pub struct DiagnosticChannel {
    listeners: Arc<ListenerList>,
    next_id: Arc<AtomicU64>,
}

impl DiagnosticChannel {
    /// Creates a channel with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener until the returned guard is dropped.
    #[must_use = "the listener is removed when the guard is dropped"]
    pub fn add_listener(&self, listener: Arc<dyn DiagnosticListener>) -> ListenerGuard {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().push((id, listener));
        ListenerGuard {
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Delivers a diagnostic to every listener and to `tracing`.
    pub fn emit(&self, diagnostic: &Diagnostic) {
        match diagnostic.level {
            DiagnosticLevel::Warning => {
                warn!(stage = %diagnostic.stage, "{}", diagnostic.message);
            }
            DiagnosticLevel::Error => {
                error!(stage = %diagnostic.stage, "{}", diagnostic.message);
            }
        }

        let listeners: Vec<Arc<dyn DiagnosticListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener.on_diagnostic(diagnostic);
        }
    }

    /// Reports a warning.
    pub fn warning(&self, stage: &str, message: impl Into<String>) {
        self.emit(&Diagnostic {
            level: DiagnosticLevel::Warning,
            stage: stage.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Reports an error.
    pub fn error(&self, stage: &str, message: impl Into<String>) {
        self.emit(&Diagnostic {
            level: DiagnosticLevel::Error,
            stage: stage.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        });
    }
}

impl fmt::Debug for DiagnosticChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticChannel")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Keeps a listener registered; unregisters it on drop.
pub struct ListenerGuard {
    id: u64,
    listeners: Arc<ListenerList>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.listeners.write().retain(|(id, _)| *id != self.id);
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BufferSink;

    #[test]
    fn test_listener_receives_diagnostics() {
        let channel = DiagnosticChannel::new();
        let sink = BufferSink::new();
        let _guard = channel.add_listener(Arc::new(SinkListener::new(Arc::new(sink.clone()))));

        channel.warning("textstats", "empty document");
        channel.error("textreader", "cannot decode");

        assert_eq!(
            sink.lines(),
            vec![
                "Warning: [textstats] empty document",
                "Error: [textreader] cannot decode"
            ]
        );
    }

    #[test]
    fn test_guard_drop_removes_listener() {
        let channel = DiagnosticChannel::new();
        let sink = BufferSink::new();

        {
            let _guard =
                channel.add_listener(Arc::new(SinkListener::new(Arc::new(sink.clone()))));
            assert_eq!(channel.listener_count(), 1);
        }

        assert_eq!(channel.listener_count(), 0);
        channel.warning("echo", "nobody listens");
        assert!(sink.contents().is_empty());
    }

    #[test]
    fn test_clones_share_listeners() {
        let channel = DiagnosticChannel::new();
        let clone = channel.clone();
        let sink = BufferSink::new();
        let _guard = channel.add_listener(Arc::new(SinkListener::new(Arc::new(sink.clone()))));

        clone.warning("echo", "via clone");

        assert_eq!(sink.lines().len(), 1);
    }
}
