//! WebSocket client connector.
//!
//! Each channel is a task that performs the handshake, forwards queued
//! writes and reports everything else as `ChannelEvent`s.

use futures::{SinkExt, StreamExt};
use remote_runner_core::{
    Channel, ChannelCreationError, ChannelEvent, ChannelEvents, ChannelSendError, Connector,
};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Message, client::IntoClientRequest, handshake::client::Request},
};
use tracing::{debug, warn};

/// Close code reported when the connection ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

enum Outgoing {
    Text(String),
    Close,
}

/// Opens channels with tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn open(
        &self,
        url: &str,
        events: ChannelEvents,
    ) -> Result<Box<dyn Channel>, ChannelCreationError> {
        let invalid = |reason: String| ChannelCreationError::InvalidEndpoint {
            url: url.to_owned(),
            reason,
        };

        let request = url.into_client_request().map_err(|e| invalid(e.to_string()))?;
        match request.uri().scheme_str() {
            Some("ws" | "wss") => {}
            other => {
                return Err(invalid(format!("unsupported scheme {other:?}")));
            }
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChannelCreationError::Unavailable(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(run_channel(request, events, rx));

        Ok(Box::new(WsChannel { tx }))
    }
}

struct WsChannel {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Channel for WsChannel {
    fn send(&mut self, text: String) -> Result<(), ChannelSendError> {
        self.tx
            .send(Outgoing::Text(text))
            .map_err(|_| ChannelSendError::ChannelClosed)
    }

    fn close(&mut self) {
        let _ = self.tx.send(Outgoing::Close);
    }
}

fn abnormal_close(events: &ChannelEvents, detail: String) {
    events.emit(ChannelEvent::Error(detail));
    events.emit(ChannelEvent::Closed {
        code: Some(ABNORMAL_CLOSURE),
        reason: String::new(),
    });
}

async fn run_channel(
    request: Request,
    events: ChannelEvents,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    let generation = events.generation();

    // Closing during the handshake abandons it silently.
    let connected = tokio::select! {
        result = connect_async(request) => result,
        _ = outgoing.recv() => {
            debug!(generation, "Channel closed during handshake");
            return;
        }
    };

    let socket = match connected {
        Ok((socket, _response)) => socket,
        Err(e) => {
            debug!(generation, "Handshake failed: {e}");
            abnormal_close(&events, e.to_string());
            return;
        }
    };

    events.emit(ChannelEvent::Opened);
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            command = outgoing.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        warn!(generation, "WebSocket send failed: {e}");
                        abnormal_close(&events, e.to_string());
                        return;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    debug!(generation, "Channel closed locally");
                    return;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    events.emit(ChannelEvent::Message(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    events.emit(ChannelEvent::Message(String::from_utf8_lossy(&data).into_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((None, String::new()), |f| {
                        (Some(u16::from(f.code)), f.reason.to_string())
                    });
                    events.emit(ChannelEvent::Closed { code, reason });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(generation, "WebSocket error: {e}");
                    abnormal_close(&events, e.to_string());
                    return;
                }
                None => {
                    events.emit(ChannelEvent::Closed {
                        code: Some(ABNORMAL_CLOSURE),
                        reason: String::new(),
                    });
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use remote_runner_core::TaggedEvent;

    use super::*;

    #[test]
    fn test_rejects_non_websocket_endpoint() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = WsConnector::new().open("http://localhost:8000/ws/abc", ChannelEvents::new(1, tx));
        assert!(matches!(
            result,
            Err(ChannelCreationError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_rejects_unparseable_endpoint() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = WsConnector::new().open("not a url", ChannelEvents::new(1, tx));
        assert!(matches!(
            result,
            Err(ChannelCreationError::InvalidEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _channel = WsConnector::new()
            .open(&format!("ws://{addr}/ws/abc"), ChannelEvents::new(3, tx))
            .unwrap();

        let TaggedEvent { generation, event } = rx.recv().await.unwrap();
        assert_eq!(generation, 3);
        assert!(matches!(event, ChannelEvent::Error(_)));
        assert_eq!(
            rx.recv().await.unwrap().event,
            ChannelEvent::Closed {
                code: Some(ABNORMAL_CLOSURE),
                reason: String::new()
            }
        );
    }
}
