//! Execution engine WebSocket endpoint.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    Json, Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use remote_runner_core::{
    InboundFrame,
    protocol::{self, RequestError},
};
use remote_runner_executor::CodeRunner;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};

/// First frame sent on every accepted connection.
pub const READY_MESSAGE: &str = "Execution environment ready";

/// Shared engine state.
pub struct EngineState<R> {
    runner: R,
    /// Open connections per session id.
    sessions: RwLock<HashMap<String, usize>>,
}

impl<R: CodeRunner> EngineState<R> {
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of sessions with at least one open connection.
    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn register(&self, session_id: &str) {
        *self
            .sessions
            .write()
            .await
            .entry(session_id.to_owned())
            .or_insert(0) += 1;
    }

    async fn unregister(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(count) = sessions.get_mut(session_id) {
            *count -= 1;
            if *count == 0 {
                sessions.remove(session_id);
            }
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    /// Unix epoch seconds.
    pub timestamp: i64,
    pub active_sessions: usize,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Build the engine router: `/ws/{session_id}` and `/health`.
///
/// # Example
/// ```ignore
/// let state = Arc::new(EngineState::new(InterpreterRunner::from_env()));
/// let app = create_engine_router(state);
/// ```
#[must_use]
pub fn create_engine_router<R>(state: Arc<EngineState<R>>) -> Router
where
    R: CodeRunner + 'static,
{
    Router::new()
        .route("/ws/{session_id}", get(ws_handler::<R>))
        .route("/health", get(health_handler::<R>))
        .with_state(state)
}

async fn health_handler<R>(State(state): State<Arc<EngineState<R>>>) -> Json<HealthReport>
where
    R: CodeRunner + 'static,
{
    Json(HealthReport {
        status: "healthy".to_owned(),
        timestamp: now(),
        active_sessions: state.active_sessions().await,
    })
}

async fn ws_handler<R>(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<EngineState<R>>>,
) -> impl IntoResponse
where
    R: CodeRunner + 'static,
{
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

async fn handle_socket<R>(socket: WebSocket, session_id: String, state: Arc<EngineState<R>>)
where
    R: CodeRunner + 'static,
{
    tracing::info!("WebSocket connection accepted for session: {session_id}");
    state.register(&session_id).await;

    let (mut sender, mut receiver) = socket.split();

    // Channel for sending frames to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<InboundFrame>();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.encode().into())).await.is_err() {
                break;
            }
        }
    });

    let _ = tx.send(InboundFrame::Output(READY_MESSAGE.to_owned()));

    while let Some(msg) = receiver.next().await {
        let request = match msg {
            Ok(Message::Text(text)) => protocol::decode_request(text.as_str()),
            Ok(Message::Binary(data)) => std::str::from_utf8(&data)
                .map_err(|_| RequestError::InvalidFormat)
                .and_then(protocol::decode_request),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let code = match request {
            Ok(code) => code,
            Err(e) => {
                tracing::warn!(%session_id, "Rejected request: {e}");
                let _ = tx.send(InboundFrame::Error(e.to_string()));
                continue;
            }
        };

        match state.runner.run(&code).await {
            Ok(output) => {
                if !output.stdout.is_empty() {
                    let _ = tx.send(InboundFrame::Output(output.stdout));
                }
                if !output.stderr.is_empty() {
                    let _ = tx.send(InboundFrame::Error(output.stderr));
                }
            }
            Err(e) => {
                tracing::error!(%session_id, "Error executing code: {e}");
                let _ = tx.send(InboundFrame::Error(format!("Execution error: {e}")));
            }
        }
    }

    // Let queued frames drain before the socket goes away.
    drop(tx);
    let _ = send_task.await;
    state.unregister(&session_id).await;

    tracing::info!("WebSocket for session {session_id} disconnected");
}
