//! Channel and connector traits.
//!
//! A `Connector` opens duplex channels the way a browser socket does:
//! construction returns immediately (or fails synchronously), and the
//! outcome of the handshake, inbound messages and the final close are
//! reported later as `ChannelEvent`s.

use thiserror::Error;
use tokio::sync::mpsc;

/// Event reported by an open or opening channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Handshake completed.
    Opened,
    /// Text payload received.
    Message(String),
    /// Transport-level problem. A `Closed` event follows.
    Error(String),
    /// Channel is gone.
    Closed { code: Option<u16>, reason: String },
}

/// Channel event tagged with the connect attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: ChannelEvent,
}

/// Event sink handed to a connector for one connect attempt.
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl ChannelEvents {
    /// Create a sink that tags every event with `generation`.
    #[must_use]
    pub const fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event.
    ///
    /// Returns false if the session is no longer listening.
    pub fn emit(&self, event: ChannelEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Channel could not be constructed at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelCreationError {
    #[error("Invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("Channel unavailable: {0}")]
    Unavailable(String),
}

/// Write to a channel failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelSendError {
    #[error("Channel closed")]
    ChannelClosed,
    #[error("Send failed: {0}")]
    Failed(String),
}

/// Write half of one duplex channel.
pub trait Channel: Send {
    /// Queue a text payload for transmission.
    ///
    /// # Errors
    /// Returns error if the channel can no longer accept writes.
    fn send(&mut self, text: String) -> Result<(), ChannelSendError>;

    /// Close the channel. Idempotent.
    fn close(&mut self);
}

/// Factory for duplex channels.
pub trait Connector: Send + 'static {
    /// Start opening a channel to `url`.
    ///
    /// Must not wait for the handshake. The result of the handshake and all
    /// later activity are reported through `events`.
    ///
    /// # Errors
    /// Returns error if the channel cannot even be constructed.
    fn open(&self, url: &str, events: ChannelEvents)
    -> Result<Box<dyn Channel>, ChannelCreationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_tagged_with_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = ChannelEvents::new(7, tx);
        assert_eq!(events.generation(), 7);
        assert!(events.emit(ChannelEvent::Opened));
        assert_eq!(
            rx.try_recv().unwrap(),
            TaggedEvent {
                generation: 7,
                event: ChannelEvent::Opened
            }
        );
    }

    #[test]
    fn test_emit_reports_dropped_listener() {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = ChannelEvents::new(1, tx);
        drop(rx);
        assert!(!events.emit(ChannelEvent::Message("late".into())));
    }
}
