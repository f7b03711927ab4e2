//! FIFO work queue feeding the execution server.

use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::context::TextSink;
use crate::errors::PypeError;

/// One pipeline command waiting to run.
#[derive(Clone)]
pub struct QueueItem {
    /// Identifier used in events and logs.
    pub id: Uuid,
    /// The flat pipeline command string.
    pub command: String,
    /// Overrides the server's output sink for this item.
    pub output: Option<Arc<dyn TextSink>>,
    /// Additional sink receiving this item's diagnostics.
    pub errors: Option<Arc<dyn TextSink>>,
}

impl QueueItem {
    /// Creates an item for `command`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: command.into(),
            output: None,
            errors: None,
        }
    }

    /// Sends this item's run log to `output`.
    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn TextSink>) -> Self {
        self.output = Some(output);
        self
    }

    /// Also sends this item's diagnostics to `errors`.
    #[must_use]
    pub fn with_errors(mut self, errors: Arc<dyn TextSink>) -> Self {
        self.errors = Some(errors);
        self
    }
}

impl From<&str> for QueueItem {
    fn from(command: &str) -> Self {
        Self::new(command)
    }
}

impl From<String> for QueueItem {
    fn from(command: String) -> Self {
        Self::new(command)
    }
}

impl std::fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueItem")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("has_output", &self.output.is_some())
            .field("has_errors", &self.errors.is_some())
            .finish()
    }
}

/// Producer half of the work queue. Clones feed the same queue.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    sender: mpsc::UnboundedSender<QueueItem>,
}

impl WorkQueue {
    /// Appends an item and returns its id.
    pub fn enqueue(&self, item: impl Into<QueueItem>) -> Result<Uuid, PypeError> {
        let item = item.into();
        let id = item.id;
        self.sender.send(item).map_err(|_| PypeError::QueueClosed)?;
        Ok(id)
    }

    /// Returns true once the server side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consumer half of the work queue, owned by a single server loop.
#[derive(Debug)]
pub struct QueueReceiver {
    pub(crate) receiver: mpsc::UnboundedReceiver<QueueItem>,
}

/// Creates a connected queue pair.
#[must_use]
pub fn work_queue() -> (WorkQueue, QueueReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (WorkQueue { sender }, QueueReceiver { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_preserves_order() {
        let (queue, mut rx) = work_queue();
        queue.enqueue("first").unwrap();
        queue.enqueue(String::from("second")).unwrap();

        assert_eq!(rx.receiver.try_recv().unwrap().command, "first");
        assert_eq!(rx.receiver.try_recv().unwrap().command, "second");
    }

    #[test]
    fn test_enqueue_after_receiver_dropped() {
        let (queue, rx) = work_queue();
        drop(rx);

        assert!(queue.is_closed());
        assert!(matches!(queue.enqueue("late"), Err(PypeError::QueueClosed)));
    }

    #[test]
    fn test_items_get_distinct_ids() {
        let a = QueueItem::new("echo -message a");
        let b = QueueItem::new("echo -message a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_cloned_producers_feed_one_receiver() {
        let (queue, mut rx) = work_queue();
        let other = queue.clone();
        let id = other.enqueue("from clone").unwrap();
        drop(queue);
        drop(other);

        let item = tokio_test::block_on(rx.receiver.recv()).unwrap();
        assert_eq!(item.id, id);
        assert!(tokio_test::block_on(rx.receiver.recv()).is_none());
    }
}
