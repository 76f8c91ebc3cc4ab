//! Connection lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a session connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No channel, nothing scheduled.
    #[default]
    Idle,
    /// Channel handshake in progress.
    Connecting,
    /// Channel is open.
    Open,
    /// Channel closed and no retry pending.
    Closed,
    /// Channel closed, reconnect timer pending.
    RetryScheduled,
    /// Retry budget exhausted.
    Failed,
}

impl ConnectionState {
    /// Whether a connect request should start a new attempt from this state.
    #[must_use]
    pub const fn accepts_connect(self) -> bool {
        !matches!(self, Self::Connecting | Self::Open)
    }

    /// Whether channel open/error/close events are meaningful in this state.
    #[must_use]
    pub const fn has_live_channel(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

/// Snapshot of a session connection, as observed by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Open and not faulted; sends are accepted.
    pub connected: bool,
    /// The channel reported an error and its close is still pending.
    pub faulted: bool,
    /// Consecutive unsolicited closes since the last successful open.
    pub retry_count: u32,
    /// Latest surfaced error, if not dismissed.
    pub error: Option<String>,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Handshake in progress and not yet failed.
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting && !self.faulted
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
