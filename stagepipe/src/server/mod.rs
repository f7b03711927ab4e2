//! Long-running execution server.
//!
//! The server pops pipeline commands from a [`WorkQueue`] in FIFO order and
//! runs each one to completion before taking the next. A failing or
//! panicking pipeline is reported and the loop continues.

mod queue;
mod stop;

pub use queue::{work_queue, QueueItem, QueueReceiver, WorkQueue};
pub use stop::StopToken;

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, info, warn};

use crate::context::{DiagnosticChannel, ExecutionContext, RunnerOptions, SinkListener, TextSink};
use crate::errors::PypeError;
use crate::events::{EventSink, NoOpEventSink};
use crate::pipeline::ChainRunner;
use crate::stages::StageRegistry;

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_return_if_empty() -> bool {
    false
}

fn default_log_on() -> bool {
    true
}

/// Configuration for the execution server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// How long to sleep when the queue is empty.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Return once the queue is empty and at least one item was processed.
    #[serde(default = "default_return_if_empty")]
    pub return_if_empty: bool,
    /// Write each pipeline's run log.
    #[serde(default = "default_log_on")]
    pub log_on: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            return_if_empty: default_return_if_empty(),
            log_on: default_log_on(),
        }
    }
}

impl ServerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the poll interval in milliseconds.
    #[must_use]
    pub fn with_poll_interval_ms(mut self, millis: u64) -> Self {
        self.poll_interval_ms = millis;
        self
    }

    /// Sets `return_if_empty`.
    #[must_use]
    pub fn with_return_if_empty(mut self, return_if_empty: bool) -> Self {
        self.return_if_empty = return_if_empty;
        self
    }

    /// Sets `log_on`.
    #[must_use]
    pub fn with_log(mut self, log_on: bool) -> Self {
        self.log_on = log_on;
        self
    }

    /// The poll interval as a duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Counters for one `serve` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServeSummary {
    /// Items taken off the queue.
    pub processed: usize,
    /// Items whose pipeline returned an error or recorded failures.
    pub failed: usize,
    /// Items whose pipeline panicked.
    pub panicked: usize,
}

enum ItemOutcome {
    Succeeded,
    Failed,
    Panicked,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs queued pipelines one at a time.
pub struct ExecutionServer {
    registry: Arc<StageRegistry>,
    config: ServerConfig,
    event_sink: Arc<dyn EventSink>,
    stop: Arc<StopToken>,
}

impl ExecutionServer {
    /// Creates a server resolving stages from `registry`.
    #[must_use]
    pub fn new(registry: Arc<StageRegistry>) -> Self {
        Self {
            registry,
            config: ServerConfig::default(),
            event_sink: Arc::new(NoOpEventSink),
            stop: StopToken::shared(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink shared by the server and its pipelines.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Uses an externally owned stop token.
    #[must_use]
    pub fn with_stop_token(mut self, stop: Arc<StopToken>) -> Self {
        self.stop = stop;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the stop token.
    #[must_use]
    pub fn stop_token(&self) -> Arc<StopToken> {
        Arc::clone(&self.stop)
    }

    /// Asks the serve loop to exit before taking its next item.
    pub fn request_stop(&self, reason: impl Into<String>) {
        self.stop.request_stop(reason);
    }

    /// Serves the queue until it is drained, closed or stopped.
    ///
    /// Run logs go to `output` unless an item carries its own sink; engine
    /// diagnostics go to `errors` for as long as the loop runs.
    pub async fn serve(
        &self,
        queue: &mut QueueReceiver,
        output: Arc<dyn TextSink>,
        errors: Arc<dyn TextSink>,
        return_if_empty: bool,
    ) -> ServeSummary {
        let diagnostics = DiagnosticChannel::new();
        let _listener = diagnostics.add_listener(Arc::new(SinkListener::new(Arc::clone(&errors))));
        let mut summary = ServeSummary::default();
        info!(return_if_empty, "Execution server started");

        loop {
            if self.stop.is_stop_requested() {
                info!(reason = ?self.stop.reason(), "Execution server stopping");
                break;
            }

            match queue.receiver.try_recv() {
                Ok(item) => {
                    summary.processed += 1;
                    match self.process(item, &output, &errors, &diagnostics).await {
                        ItemOutcome::Succeeded => {}
                        ItemOutcome::Failed => summary.failed += 1,
                        ItemOutcome::Panicked => summary.panicked += 1,
                    }
                }
                Err(TryRecvError::Empty) => {
                    if return_if_empty && summary.processed > 0 {
                        debug!("Queue empty, returning");
                        break;
                    }
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
                Err(TryRecvError::Disconnected) => {
                    debug!("Queue closed and drained");
                    break;
                }
            }
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            panicked = summary.panicked,
            "Execution server finished"
        );
        summary
    }

    async fn process(
        &self,
        item: QueueItem,
        output: &Arc<dyn TextSink>,
        errors: &Arc<dyn TextSink>,
        diagnostics: &DiagnosticChannel,
    ) -> ItemOutcome {
        let id = item.id;
        info!(%id, command = %item.command, "Running queued pipeline");
        self.event_sink
            .emit(
                "queue.item.started",
                Some(json!({"id": id.to_string(), "command": item.command})),
            )
            .await;

        let _item_listener = item
            .errors
            .as_ref()
            .map(|sink| diagnostics.add_listener(Arc::new(SinkListener::new(Arc::clone(sink)))));
        let item_output = item.output.clone().unwrap_or_else(|| Arc::clone(output));

        let ctx = ExecutionContext::new()
            .with_options(
                RunnerOptions::new()
                    .with_abort_on_error(false)
                    .with_log(self.config.log_on),
            )
            .with_output(Arc::clone(&item_output))
            .with_diagnostics(diagnostics.clone())
            .with_event_sink(Arc::clone(&self.event_sink));
        let runner = ChainRunner::new(Arc::clone(&self.registry), ctx);
        let command = item.command;
        let joined = tokio::task::spawn_blocking(move || runner.run_command(&command)).await;

        let outcome = match joined {
            Ok(Ok(result)) if result.success() => ItemOutcome::Succeeded,
            Ok(Ok(result)) => {
                warn!(%id, failures = result.failures.len(), "Queued pipeline had failures");
                for failure in &result.failures {
                    errors.write_text(&format!("Error: {}\n", failure.error));
                }
                ItemOutcome::Failed
            }
            Ok(Err(err)) => {
                error!(%id, error = %err, "Queued pipeline failed");
                errors.write_text(&format!("Error: {err}\n"));
                ItemOutcome::Failed
            }
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic().as_ref());
                error!(%id, panic = %message, "Queued pipeline panicked");
                errors.write_text(&format!("Error: pipeline panicked: {message}\n"));
                ItemOutcome::Panicked
            }
            Err(join_err) => {
                let err = PypeError::Join(join_err.to_string());
                error!(%id, error = %err, "Queued pipeline was cancelled");
                errors.write_text(&format!("Error: {err}\n"));
                ItemOutcome::Failed
            }
        };
        errors.flush();
        item_output.flush();

        self.event_sink
            .emit(
                "queue.item.completed",
                Some(json!({
                    "id": id.to_string(),
                    "success": matches!(outcome, ItemOutcome::Succeeded),
                })),
            )
            .await;
        outcome
    }
}

impl std::fmt::Debug for ExecutionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionServer")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("stop", &self.stop)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BufferSink;
    use crate::events::CollectingEventSink;
    use crate::testing::{register_panicking_stage, register_recording_stage, CallLog};

    fn recording_server(log: &CallLog) -> ExecutionServer {
        let registry = StageRegistry::with_builtins();
        register_recording_stage(&registry, "first", log);
        register_recording_stage(&registry, "second", log);
        register_panicking_stage(&registry, "explode");
        ExecutionServer::new(Arc::new(registry))
            .with_config(ServerConfig::new().with_poll_interval_ms(5))
    }

    fn sinks() -> (BufferSink, BufferSink) {
        (BufferSink::new(), BufferSink::new())
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: ServerConfig = serde_json::from_str(r#"{"return_if_empty": true}"#).unwrap();
        assert_eq!(config.poll_interval_ms, 100);
        assert!(config.return_if_empty);
        assert!(config.log_on);
    }

    #[tokio::test]
    async fn test_serves_in_fifo_order() {
        let log = CallLog::new();
        let server = recording_server(&log);
        let (queue, mut rx) = work_queue();
        queue.enqueue("first -tag a").unwrap();
        queue.enqueue("second -tag b").unwrap();
        queue.enqueue("first -tag c").unwrap();

        let (out, err) = sinks();
        let summary = server
            .serve(&mut rx, Arc::new(out), Arc::new(err), true)
            .await;

        assert_eq!(summary.processed, 3);
        assert_eq!(log.entries(), vec!["first:a", "second:b", "first:c"]);
    }

    #[tokio::test]
    async fn test_returns_when_queue_closed() {
        let log = CallLog::new();
        let server = recording_server(&log);
        let (queue, mut rx) = work_queue();
        queue.enqueue("first -tag only").unwrap();
        drop(queue);

        let (out, err) = sinks();
        let summary = server
            .serve(&mut rx, Arc::new(out), Arc::new(err), false)
            .await;

        assert_eq!(summary.processed, 1);
        assert_eq!(log.entries(), vec!["first:only"]);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_loop() {
        let log = CallLog::new();
        let server = recording_server(&log);
        let (queue, mut rx) = work_queue();
        queue.enqueue("nosuchstage -x 1").unwrap();
        queue.enqueue("explode").unwrap();
        queue.enqueue("first -tag survived").unwrap();

        let (out, err) = sinks();
        let summary = server
            .serve(&mut rx, Arc::new(out), Arc::new(err.clone()), true)
            .await;

        assert_eq!(
            summary,
            ServeSummary {
                processed: 3,
                failed: 1,
                panicked: 1
            }
        );
        assert_eq!(log.entries(), vec!["first:survived"]);
        let errors = err.contents();
        assert!(errors.contains("Unknown stage: 'nosuchstage'"));
        assert!(errors.contains("stage panicked on purpose"));
    }

    #[tokio::test]
    async fn test_stop_request_exits_before_next_item() {
        let log = CallLog::new();
        let server = recording_server(&log);
        let (queue, mut rx) = work_queue();
        queue.enqueue("first -tag never").unwrap();
        server.request_stop("shutdown");

        let (out, err) = sinks();
        let summary = server
            .serve(&mut rx, Arc::new(out), Arc::new(err), false)
            .await;

        assert_eq!(summary.processed, 0);
        assert!(log.is_empty());
        assert_eq!(server.stop_token().reason().as_deref(), Some("shutdown"));
    }

    #[tokio::test]
    async fn test_item_sinks_and_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();

        let log = CallLog::new();
        let server = recording_server(&log);
        let (queue, mut rx) = work_queue();
        let item_out = BufferSink::new();
        let item_err = BufferSink::new();
        queue
            .enqueue(
                QueueItem::new(format!("textstats {}", path.display()))
                    .with_output(Arc::new(item_out.clone()))
                    .with_errors(Arc::new(item_err.clone())),
            )
            .unwrap();

        let (out, err) = sinks();
        server
            .serve(&mut rx, Arc::new(out.clone()), Arc::new(err.clone()), true)
            .await;

        assert!(item_out.contents().contains("Done executing textstats."));
        assert!(out.contents().is_empty());
        assert_eq!(item_err.lines(), vec!["Warning: [textstats] empty document"]);
        assert_eq!(err.lines(), vec!["Warning: [textstats] empty document"]);
    }

    #[tokio::test]
    async fn test_emits_queue_events() {
        let log = CallLog::new();
        let events = Arc::new(CollectingEventSink::new());
        let server = recording_server(&log).with_event_sink(events.clone());
        let (queue, mut rx) = work_queue();
        queue.enqueue("first").unwrap();

        let (out, err) = sinks();
        server
            .serve(&mut rx, Arc::new(out), Arc::new(err), true)
            .await;

        let types = events.event_types();
        assert_eq!(types.first().map(String::as_str), Some("queue.item.started"));
        assert_eq!(types.last().map(String::as_str), Some("queue.item.completed"));
        assert!(types.iter().any(|t| t == "stage.completed"));
    }
}
