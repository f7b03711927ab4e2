//! Text sinks for the human-readable run log.

use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

/// Destination for the run log and stage output text.
///
/// Implementations must never fail loudly: a broken sink drops text rather
/// than aborting a pipeline.
pub trait TextSink: Send + Sync {
    /// Writes a chunk of text. Newlines are the caller's responsibility.
    fn write_text(&self, text: &str);

    /// Flushes buffered text, if any.
    fn flush(&self) {}
}

/// Writes to the process stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl TextSink for StdoutSink {
    fn write_text(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

/// Writes to the process stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl TextSink for StderrSink {
    fn write_text(&self, text: &str) {
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(text.as_bytes());
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TextSink for NullSink {
    fn write_text(&self, _text: &str) {}
}

/// Accumulates text in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    buffer: Arc<Mutex<String>>,
}

impl BufferSink {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        self.buffer.lock().clone()
    }

    /// Returns the written text split into lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.buffer.lock().lines().map(str::to_string).collect()
    }

    /// Returns and clears the buffer.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.buffer.lock())
    }
}

impl TextSink for BufferSink {
    fn write_text(&self, text: &str) {
        self.buffer.lock().push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sink_shared_between_clones() {
        let sink = BufferSink::new();
        let clone = sink.clone();

        clone.write_text("first\n");
        sink.write_text("second\n");

        assert_eq!(sink.lines(), vec!["first", "second"]);
        assert_eq!(sink.take(), "first\nsecond\n");
        assert!(clone.contents().is_empty());
    }

    #[test]
    fn test_null_sink_discards() {
        NullSink.write_text("ignored");
        NullSink.flush();
    }
}
