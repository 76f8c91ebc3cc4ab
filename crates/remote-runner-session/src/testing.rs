//! In-process connector used by the lifecycle tests.

use std::sync::{Arc, Mutex};

use remote_runner_core::{
    Channel, ChannelCreationError, ChannelEvent, ChannelEvents, ChannelSendError, Connector,
};

#[derive(Default)]
struct Inner {
    opened: Vec<(String, ChannelEvents)>,
    writes: Vec<String>,
    closed: usize,
    fail_next: Option<ChannelCreationError>,
}

/// Connector whose channels are driven by the test.
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<Inner>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail synchronously.
    pub fn fail_next_open(&self, error: ChannelCreationError) {
        self.inner.lock().unwrap().fail_next = Some(error);
    }

    /// Number of channels constructed so far.
    pub fn attempts(&self) -> usize {
        self.inner.lock().unwrap().opened.len()
    }

    pub fn url(&self, attempt: usize) -> String {
        self.inner.lock().unwrap().opened[attempt].0.clone()
    }

    /// Payloads written across all channels.
    pub fn writes(&self) -> Vec<String> {
        self.inner.lock().unwrap().writes.clone()
    }

    /// Channels closed by the session.
    pub fn closed(&self) -> usize {
        self.inner.lock().unwrap().closed
    }

    /// Report an event on the channel of the given attempt.
    pub fn emit_on(&self, attempt: usize, event: ChannelEvent) {
        let events = self.inner.lock().unwrap().opened[attempt].1.clone();
        events.emit(event);
    }

    /// Report an event on the most recent channel.
    pub fn emit(&self, event: ChannelEvent) {
        let attempt = self.attempts() - 1;
        self.emit_on(attempt, event);
    }

    /// Report a transport failure followed by close, as a browser socket does.
    pub fn drop_connection(&self) {
        self.emit(ChannelEvent::Error("connection reset".into()));
        self.emit(ChannelEvent::Closed {
            code: Some(1006),
            reason: String::new(),
        });
    }
}

struct MockChannel {
    inner: Arc<Mutex<Inner>>,
    closed: bool,
}

impl Channel for MockChannel {
    fn send(&mut self, text: String) -> Result<(), ChannelSendError> {
        if self.closed {
            return Err(ChannelSendError::ChannelClosed);
        }
        self.inner.lock().unwrap().writes.push(text);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.lock().unwrap().closed += 1;
        }
    }
}

impl Connector for MockConnector {
    fn open(
        &self,
        url: &str,
        events: ChannelEvents,
    ) -> Result<Box<dyn Channel>, ChannelCreationError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next.take() {
            return Err(error);
        }
        inner.opened.push((url.to_owned(), events));
        Ok(Box::new(MockChannel {
            inner: Arc::clone(&self.inner),
            closed: false,
        }))
    }
}
