//! Presentation-facing session adapter.
//!
//! `SessionConsole` runs the `ConnectionManager` on a dedicated task and
//! exposes it through commands and observable state. Every mutation happens
//! on that task, one event at a time, so callers never block and never race
//! the lifecycle.

use std::sync::Arc;

use futures::stream::BoxStream;
use remote_runner_core::{ConnectionError, ConnectionStatus, Connector, OutputLog, SessionId};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    ClientConfig,
    manager::{ConnectionManager, ManagerInbox},
};

enum Command {
    Connect,
    Retry,
    Run {
        code: String,
        reply: oneshot::Sender<Result<(), ConnectionError>>,
    },
    ClearError,
    Shutdown,
}

/// Handle to one client session.
///
/// Dropping the handle tears the session down.
pub struct SessionConsole {
    session_id: SessionId,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    output: Arc<OutputLog>,
    task: Option<JoinHandle<()>>,
}

impl SessionConsole {
    /// Create a session and start connecting immediately.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start<C: Connector>(config: &ClientConfig, connector: C) -> Self {
        let console = Self::spawn(config, connector);
        console.connect();
        console
    }

    /// Create an idle session. Call `connect` to open the channel.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn<C: Connector>(config: &ClientConfig, connector: C) -> Self {
        let session_id = SessionId::new();
        let output = Arc::new(OutputLog::new());
        let (manager, inbox) = ConnectionManager::new(
            session_id,
            config.endpoint(&session_id),
            connector,
            config.retry,
            Arc::clone(&output),
        );
        let status = manager.subscribe();
        let (commands, commands_rx) = mpsc::unbounded_channel();

        tracing::info!(%session_id, endpoint = manager.endpoint(), "Session created");
        let task = tokio::spawn(drive(manager, inbox, commands_rx));

        Self {
            session_id,
            commands,
            status,
            output,
            task: Some(task),
        }
    }

    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Open the channel unless it is already open or opening.
    pub fn connect(&self) {
        self.dispatch(Command::Connect);
    }

    /// Reset the retry budget and reconnect unconditionally.
    pub fn retry_connection(&self) {
        self.dispatch(Command::Retry);
    }

    /// Dismiss the current error.
    pub fn clear_error(&self) {
        self.dispatch(Command::ClearError);
    }

    /// Submit code for execution.
    ///
    /// Resolves once the request has been written to the channel or
    /// refused; output arrives later through the output log.
    ///
    /// # Errors
    /// Returns `NotConnected` if the session is not open, `SendFailed` if the
    /// write failed, or `SessionClosed` after shutdown.
    pub async fn run_code(&self, code: impl Into<String>) -> Result<(), ConnectionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Run {
                code: code.into(),
                reply,
            })
            .map_err(|_| ConnectionError::SessionClosed)?;
        rx.await.map_err(|_| ConnectionError::SessionClosed)?
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.status.borrow().is_connecting()
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.status.borrow().error.clone()
    }

    /// Receiver notified on every status change.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Wait until the status satisfies `predicate`.
    ///
    /// # Errors
    /// Returns `SessionClosed` if the session ends first.
    pub async fn wait_for<F>(&self, predicate: F) -> Result<ConnectionStatus, ConnectionError>
    where
        F: FnMut(&ConnectionStatus) -> bool,
    {
        let mut status = self.status.clone();
        status
            .wait_for(predicate)
            .await
            .map(|s| s.clone())
            .map_err(|_| ConnectionError::SessionClosed)
    }

    /// All output lines so far.
    #[must_use]
    pub fn output_lines(&self) -> Vec<String> {
        self.output.snapshot()
    }

    #[must_use]
    pub fn output(&self) -> Arc<OutputLog> {
        Arc::clone(&self.output)
    }

    /// Existing output followed by live lines.
    #[must_use]
    pub fn output_stream(&self) -> BoxStream<'static, String> {
        self.output.history_plus_stream()
    }

    /// Tear the session down and wait for the driver to finish.
    pub async fn shutdown(mut self) {
        self.dispatch(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(session_id = %self.session_id, "Session driver failed: {e}");
            }
        }
    }

    fn dispatch(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!(session_id = %self.session_id, "Session driver is gone");
        }
    }
}

impl Drop for SessionConsole {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

async fn drive<C: Connector>(
    mut manager: ConnectionManager<C>,
    mut inbox: ManagerInbox,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Connect) => manager.connect(),
                Some(Command::Retry) => manager.retry(),
                Some(Command::Run { code, reply }) => {
                    let _ = reply.send(manager.send(&code));
                }
                Some(Command::ClearError) => manager.clear_error(),
                Some(Command::Shutdown) | None => break,
            },
            Some(event) = inbox.next() => manager.handle(event),
        }
    }
    manager.teardown();
}
