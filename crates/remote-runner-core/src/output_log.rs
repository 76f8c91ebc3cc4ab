//! Append-only output history with live subscription.

use std::sync::{PoisonError, RwLock};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Capacity of the live broadcast channel. Lagging subscribers skip lines
/// but the history itself is never pruned.
const LIVE_CAPACITY: usize = 10_000;

/// Ordered log of output lines for one session.
///
/// Insertion order is display order. Rendering surfaces either take a
/// snapshot or follow the stream of history plus live lines.
pub struct OutputLog {
    history: RwLock<Vec<String>>,
    sender: broadcast::Sender<String>,
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            history: RwLock::new(Vec::with_capacity(32)),
            sender,
        }
    }

    /// Append a line to history and to live listeners.
    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        // Hold the write lock while broadcasting so subscribers taking a
        // snapshot never miss or duplicate a line.
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        let _ = self.sender.send(line.clone());
        history.push(line);
    }

    /// All lines in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stream that yields the existing history, then live lines.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, String> {
        let (history, rx) = {
            let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
            (history.clone(), self.sender.subscribe())
        };

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move {
            if let Err(e) = &res {
                tracing::warn!("Output subscriber lagged: {e}");
            }
            res.ok()
        });

        Box::pin(hist.chain(live))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_append_preserves_order_and_duplicates() {
        let log = OutputLog::new();
        assert!(log.is_empty());
        log.append("a");
        log.append("b");
        log.append("a");
        assert_eq!(log.snapshot(), vec!["a", "b", "a"]);
        assert_eq!(log.len(), 3);
    }

    #[tokio::test]
    async fn test_stream_yields_history_then_live() {
        let log = Arc::new(OutputLog::new());
        log.append("first");

        let mut stream = log.history_plus_stream();
        log.append("second");

        assert_eq!(stream.next().await.as_deref(), Some("first"));
        assert_eq!(stream.next().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_neither_lost_nor_duplicated() {
        let log = Arc::new(OutputLog::new());
        let stream = log.history_plus_stream();

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    for i in 0..25 {
                        log.append(format!("{w}-{i}"));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let streamed: Vec<String> = stream.take(100).collect().await;
        assert_eq!(streamed, log.snapshot());
    }
}
