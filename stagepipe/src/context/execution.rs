//! The shared context a chain runs in.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{DiagnosticChannel, StdoutSink, TextSink};
use crate::events::{EventSink, NoOpEventSink};

fn default_abort_on_error() -> bool {
    true
}

fn default_log_on() -> bool {
    true
}

fn default_auto_pipe() -> bool {
    true
}

/// Behavioural switches for a chain run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerOptions {
    /// Stop at the first failing stage and return its error.
    #[serde(default = "default_abort_on_error")]
    pub abort_on_error: bool,
    /// Write the run log to the text sink.
    #[serde(default = "default_log_on")]
    pub log_on: bool,
    /// Fill unset inputs from matching outputs of earlier stages.
    #[serde(default = "default_auto_pipe")]
    pub auto_pipe: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            abort_on_error: default_abort_on_error(),
            log_on: default_log_on(),
            auto_pipe: default_auto_pipe(),
        }
    }
}

impl RunnerOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `abort_on_error`.
    #[must_use]
    pub fn with_abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = abort;
        self
    }

    /// Sets `log_on`.
    #[must_use]
    pub fn with_log(mut self, log_on: bool) -> Self {
        self.log_on = log_on;
        self
    }

    /// Sets `auto_pipe`.
    #[must_use]
    pub fn with_auto_pipe(mut self, auto_pipe: bool) -> Self {
        self.auto_pipe = auto_pipe;
        self
    }
}

type InputStream = Arc<Mutex<Box<dyn BufRead + Send>>>;

/// Everything a chain run shares across its stages.
///
/// Holds the run log sink, an optional interactive input stream, the
/// diagnostic channel, the event sink, and the last path a stage visited.
pub struct ExecutionContext {
    options: RunnerOptions,
    output: Arc<dyn TextSink>,
    input: Option<InputStream>,
    diagnostics: DiagnosticChannel,
    event_sink: Arc<dyn EventSink>,
    last_visited_path: RwLock<PathBuf>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// Creates a context logging to stdout with default options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: RunnerOptions::default(),
            output: Arc::new(StdoutSink),
            input: None,
            diagnostics: DiagnosticChannel::new(),
            event_sink: Arc::new(NoOpEventSink),
            last_visited_path: RwLock::new(PathBuf::new()),
        }
    }

    /// Replaces all options.
    #[must_use]
    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets `abort_on_error`.
    #[must_use]
    pub fn with_abort_on_error(mut self, abort: bool) -> Self {
        self.options.abort_on_error = abort;
        self
    }

    /// Sets `log_on`.
    #[must_use]
    pub fn with_log(mut self, log_on: bool) -> Self {
        self.options.log_on = log_on;
        self
    }

    /// Sets `auto_pipe`.
    #[must_use]
    pub fn with_auto_pipe(mut self, auto_pipe: bool) -> Self {
        self.options.auto_pipe = auto_pipe;
        self
    }

    /// Redirects the run log.
    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn TextSink>) -> Self {
        self.output = output;
        self
    }

    /// Attaches an interactive input stream.
    #[must_use]
    pub fn with_input(mut self, input: Box<dyn BufRead + Send>) -> Self {
        self.input = Some(Arc::new(Mutex::new(input)));
        self
    }

    /// Uses an existing diagnostic channel.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticChannel) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the initial last visited path.
    #[must_use]
    pub fn with_last_visited_path(self, path: impl Into<PathBuf>) -> Self {
        *self.last_visited_path.write() = path.into();
        self
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Returns `abort_on_error`.
    #[must_use]
    pub fn abort_on_error(&self) -> bool {
        self.options.abort_on_error
    }

    /// Returns `log_on`.
    #[must_use]
    pub fn log_on(&self) -> bool {
        self.options.log_on
    }

    /// Returns `auto_pipe`.
    #[must_use]
    pub fn auto_pipe(&self) -> bool {
        self.options.auto_pipe
    }

    /// Returns the run log sink.
    #[must_use]
    pub fn output(&self) -> &Arc<dyn TextSink> {
        &self.output
    }

    /// Returns the diagnostic channel.
    #[must_use]
    pub fn diagnostics(&self) -> &DiagnosticChannel {
        &self.diagnostics
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Writes one log line, indented by `indent` levels, when logging is on.
    pub fn log(&self, message: &str, indent: usize) {
        debug!(target: "stagepipe::run", "{message}");
        if self.options.log_on {
            let pad = "    ".repeat(indent);
            self.output.write_text(&format!("{pad}{message}\n"));
        }
    }

    /// Writes text regardless of `log_on` (usage text, error reports).
    pub fn write_text(&self, text: &str) {
        self.output.write_text(text);
    }

    /// Reads one line from the input stream, printing `prompt` first.
    ///
    /// Returns `None` without an input stream or at end of input.
    pub fn read_line(&self, prompt: &str) -> Option<String> {
        let input = self.input.as_ref()?;
        self.output.write_text(prompt);
        self.output.flush();

        let mut line = String::new();
        match input.lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    /// Returns the last path a stage read from or wrote to.
    #[must_use]
    pub fn last_visited_path(&self) -> PathBuf {
        self.last_visited_path.read().clone()
    }

    /// Records the directory of `path` as the last visited location.
    pub fn set_last_visited_path(&self, path: &Path) {
        let dir = path.parent().unwrap_or(path).to_path_buf();
        *self.last_visited_path.write() = dir;
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("options", &self.options)
            .field("has_input", &self.input.is_some())
            .field("diagnostics", &self.diagnostics)
            .field("last_visited_path", &self.last_visited_path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BufferSink;

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: RunnerOptions = serde_json::from_str(r#"{"log_on": false}"#).unwrap();
        assert!(options.abort_on_error);
        assert!(!options.log_on);
        assert!(options.auto_pipe);
    }

    #[test]
    fn test_log_respects_log_on() {
        let sink = BufferSink::new();
        let ctx = ExecutionContext::new()
            .with_output(Arc::new(sink.clone()))
            .with_log(false);

        ctx.log("hidden", 0);
        ctx.write_text("shown\n");

        assert_eq!(sink.contents(), "shown\n");
    }

    #[test]
    fn test_log_indents() {
        let sink = BufferSink::new();
        let ctx = ExecutionContext::new().with_output(Arc::new(sink.clone()));

        ctx.log("Radius = 1.0", 1);

        assert_eq!(sink.contents(), "    Radius = 1.0\n");
    }

    #[test]
    fn test_read_line_from_input() {
        let sink = BufferSink::new();
        let ctx = ExecutionContext::new()
            .with_output(Arc::new(sink.clone()))
            .with_input(Box::new(std::io::Cursor::new("first\nsecond\n")));

        assert_eq!(ctx.read_line("> ").as_deref(), Some("first"));
        assert_eq!(ctx.read_line("> ").as_deref(), Some("second"));
        assert_eq!(ctx.read_line("> "), None);
        assert_eq!(sink.contents(), "> > > ");
    }

    #[test]
    fn test_read_line_without_input() {
        let ctx = ExecutionContext::new();
        assert_eq!(ctx.read_line("> "), None);
    }

    #[test]
    fn test_last_visited_path_keeps_directory() {
        let ctx = ExecutionContext::new();
        ctx.set_last_visited_path(Path::new("/data/scans/a.txt"));
        assert_eq!(ctx.last_visited_path(), PathBuf::from("/data/scans"));
    }
}
