//! Connection lifecycle manager.
//!
//! One `ConnectionManager` exists per session. It exclusively owns the
//! channel handle and the pending reconnect timer, and is the only place
//! connection state changes. It is driven by discrete events: explicit
//! calls (`connect`, `retry`, `send`, `teardown`) and `ManagerEvent`s read
//! from its `ManagerInbox`.
//!
//! Every connect attempt gets a new generation. Channel events from an
//! older generation, and timers that were cancelled or superseded, are
//! ignored.

use std::sync::Arc;

use remote_runner_core::{
    Channel, ChannelEvent, ChannelEvents, ConnectionError, ConnectionState, ConnectionStatus,
    Connector, OutputLog, SessionId, TaggedEvent,
    protocol::{self, Decoded, InboundFrame},
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, trace, warn};

use crate::RetryPolicy;

/// Line appended to the output log when code is handed to the channel.
pub const EXECUTING_MARKER: &str = "> Executing code...";

/// Prefix for error lines in the output log.
pub const ERROR_PREFIX: &str = "Error: ";

/// Asynchronous input to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// Something happened on a channel.
    Channel(TaggedEvent),
    /// A reconnect timer fired.
    RetryElapsed { token: u64 },
}

/// Receiving side of the manager's event queues.
pub struct ManagerInbox {
    channel_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    timer_rx: mpsc::UnboundedReceiver<u64>,
}

impl ManagerInbox {
    /// Wait for the next event. Cancel safe.
    pub async fn next(&mut self) -> Option<ManagerEvent> {
        tokio::select! {
            Some(event) = self.channel_rx.recv() => Some(ManagerEvent::Channel(event)),
            Some(token) = self.timer_rx.recv() => Some(ManagerEvent::RetryElapsed { token }),
            else => None,
        }
    }
}

struct PendingRetry {
    token: u64,
    task: JoinHandle<()>,
}

/// Owns one session's channel and drives its reconnect state machine.
pub struct ConnectionManager<C: Connector> {
    session_id: SessionId,
    endpoint: String,
    connector: C,
    policy: RetryPolicy,
    output: Arc<OutputLog>,

    state: ConnectionState,
    /// The live channel reported an error; sends are refused until it closes.
    faulted: bool,
    generation: u64,
    retry_count: u32,
    retry_token: u64,
    error: Option<String>,
    torn_down: bool,

    channel: Option<Box<dyn Channel>>,
    pending_retry: Option<PendingRetry>,

    channel_tx: mpsc::UnboundedSender<TaggedEvent>,
    timer_tx: mpsc::UnboundedSender<u64>,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create an idle manager for `session_id`, connecting to `endpoint`.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        endpoint: String,
        connector: C,
        policy: RetryPolicy,
        output: Arc<OutputLog>,
    ) -> (Self, ManagerInbox) {
        let (channel_tx, channel_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(ConnectionStatus::default());

        let manager = Self {
            session_id,
            endpoint,
            connector,
            policy,
            output,
            state: ConnectionState::Idle,
            faulted: false,
            generation: 0,
            retry_count: 0,
            retry_token: 0,
            error: None,
            torn_down: false,
            channel: None,
            pending_retry: None,
            channel_tx,
            timer_tx,
            status_tx,
        };

        (manager, ManagerInbox { channel_rx, timer_rx })
    }

    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub const fn has_pending_retry(&self) -> bool {
        self.pending_retry.is_some()
    }

    /// Open and not faulted.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open && !self.faulted
    }

    #[must_use]
    pub fn output(&self) -> &Arc<OutputLog> {
        &self.output
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            connected: self.is_connected(),
            faulted: self.faulted,
            retry_count: self.retry_count,
            error: self.error.clone(),
        }
    }

    /// Receiver that observes every status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Start connecting unless a channel is already open or opening.
    ///
    /// A pending reconnect timer is cancelled and the attempt starts now.
    pub fn connect(&mut self) {
        if self.torn_down {
            warn!(session_id = %self.session_id, "Connect requested after teardown");
            return;
        }
        if !self.state.accepts_connect() {
            debug!(session_id = %self.session_id, state = ?self.state, "Connect ignored");
            return;
        }
        self.start_attempt();
        self.publish();
    }

    /// Reset the retry budget and reconnect, whatever the current state.
    pub fn retry(&mut self) {
        if self.torn_down {
            warn!(session_id = %self.session_id, "Retry requested after teardown");
            return;
        }
        info!(session_id = %self.session_id, state = ?self.state, "Manual reconnect");
        self.retry_count = 0;
        self.start_attempt();
        self.publish();
    }

    /// Send code for execution.
    ///
    /// On success an `execute` frame has been handed to the channel and the
    /// executing marker appended to the output log.
    ///
    /// # Errors
    /// Returns `NotConnected` without touching the channel unless the
    /// session is open, or `SendFailed` if the channel rejects the write.
    pub fn send(&mut self, code: &str) -> Result<(), ConnectionError> {
        let result = match self.channel.as_mut() {
            Some(channel) if self.state == ConnectionState::Open && !self.faulted => channel
                .send(protocol::encode_execute(code))
                .map_err(|e| ConnectionError::SendFailed(e.to_string())),
            _ => Err(ConnectionError::NotConnected),
        };

        match &result {
            Ok(()) => {
                debug!(session_id = %self.session_id, bytes = code.len(), "Sent execute frame");
                self.output.append(EXECUTING_MARKER);
            }
            Err(e @ ConnectionError::NotConnected) => {
                warn!(session_id = %self.session_id, state = ?self.state, "Run refused: {e}");
                self.error = Some(e.to_string());
            }
            Err(e) => {
                error!(session_id = %self.session_id, "{e}");
                self.surface(e.to_string());
            }
        }

        self.publish();
        result
    }

    /// Dismiss the current error.
    pub fn clear_error(&mut self) {
        if self.error.take().is_some() {
            self.publish();
        }
    }

    /// Cancel timers, close the channel and go idle for good.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.cancel_pending_retry();
        self.close_channel();
        self.generation += 1;
        self.state = ConnectionState::Idle;
        self.faulted = false;
        self.torn_down = true;
        info!(session_id = %self.session_id, "Session torn down");
        self.publish();
    }

    /// Apply an event read from the inbox.
    pub fn handle(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::Channel(tagged) => self.on_channel_event(tagged),
            ManagerEvent::RetryElapsed { token } => self.on_retry_elapsed(token),
        }
        self.publish();
    }

    fn on_channel_event(&mut self, TaggedEvent { generation, event }: TaggedEvent) {
        if generation != self.generation || !self.state.has_live_channel() {
            trace!(
                session_id = %self.session_id,
                generation,
                current = self.generation,
                ?event,
                "Ignoring stale channel event"
            );
            return;
        }

        match event {
            ChannelEvent::Opened => {
                if self.state == ConnectionState::Connecting {
                    info!(session_id = %self.session_id, generation, "Connected");
                    self.state = ConnectionState::Open;
                    self.retry_count = 0;
                    self.faulted = false;
                    self.error = None;
                }
            }
            ChannelEvent::Message(text) => self.dispatch(&text),
            ChannelEvent::Error(detail) => {
                warn!(session_id = %self.session_id, generation, "Channel error: {detail}");
                self.faulted = true;
                self.surface(ConnectionError::ChannelError(detail).to_string());
            }
            ChannelEvent::Closed { code, reason } => self.on_closed(code, reason),
        }
    }

    fn on_closed(&mut self, code: Option<u16>, reason: String) {
        self.channel = None;
        self.faulted = false;
        self.retry_count += 1;

        let close = ConnectionError::UnsolicitedClose { code, reason };
        info!(session_id = %self.session_id, generation = self.generation, "{close}");

        if self.policy.is_exhausted(self.retry_count) {
            self.state = ConnectionState::Failed;
            let exhausted = ConnectionError::RetriesExhausted {
                attempts: self.retry_count,
            };
            warn!(session_id = %self.session_id, "{exhausted}");
            self.surface(exhausted.to_string());
        } else {
            self.state = ConnectionState::RetryScheduled;
            info!(
                session_id = %self.session_id,
                delay = ?self.policy.delay,
                "Attempting to reconnect ({}/{})",
                self.retry_count,
                self.policy.ceiling
            );
            self.schedule_retry();
        }
    }

    fn on_retry_elapsed(&mut self, token: u64) {
        let current = self.pending_retry.as_ref().map(|p| p.token);
        if current != Some(token) || self.state != ConnectionState::RetryScheduled {
            trace!(session_id = %self.session_id, token, "Ignoring stale retry timer");
            return;
        }
        self.pending_retry = None;
        self.start_attempt();
    }

    fn dispatch(&mut self, text: &str) {
        match protocol::decode(text) {
            Decoded::Frame(InboundFrame::Output(content)) => self.output.append(content),
            Decoded::Frame(InboundFrame::Error(content)) => self.surface(content),
            Decoded::Raw(raw) => {
                debug!(session_id = %self.session_id, "Malformed frame shown as raw output");
                self.output.append(raw);
            }
        }
    }

    fn start_attempt(&mut self) {
        self.cancel_pending_retry();
        self.close_channel();
        self.generation += 1;
        self.faulted = false;
        self.error = None;
        self.state = ConnectionState::Connecting;

        info!(
            session_id = %self.session_id,
            generation = self.generation,
            "Connecting to {}",
            self.endpoint
        );

        let events = ChannelEvents::new(self.generation, self.channel_tx.clone());
        match self.connector.open(&self.endpoint, events) {
            Ok(channel) => self.channel = Some(channel),
            Err(e) => {
                let failure = ConnectionError::ChannelCreationFailed(e.to_string());
                error!(session_id = %self.session_id, "{failure}");
                self.state = ConnectionState::Closed;
                self.surface(failure.to_string());
            }
        }
    }

    fn schedule_retry(&mut self) {
        self.cancel_pending_retry();
        self.retry_token += 1;

        let token = self.retry_token;
        let delay = self.policy.delay;
        let tx = self.timer_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(token);
        });

        self.pending_retry = Some(PendingRetry { token, task });
    }

    fn cancel_pending_retry(&mut self) {
        if let Some(pending) = self.pending_retry.take() {
            trace!(session_id = %self.session_id, token = pending.token, "Cancelling retry timer");
            pending.task.abort();
        }
    }

    fn close_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }

    /// Record `message` as the current error and in the output log.
    fn surface(&mut self, message: String) {
        self.output.append(format!("{ERROR_PREFIX}{message}"));
        self.error = Some(message);
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
