//! End-to-end tests: a real engine endpoint on a loopback port, driven by
//! both a raw WebSocket client and a `SessionConsole`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use remote_runner_core::{ConnectionState, ConnectionStatus, Decoded, InboundFrame, protocol};
use remote_runner_executor::{CodeRunner, ExecutionOutput, RunnerError};
use remote_runner_session::{
    ClientConfig, RetryPolicy, SessionConsole,
    manager::{ERROR_PREFIX, EXECUTING_MARKER},
};
use remote_runner_transport::{EngineState, WsConnector, create_engine_router};
use tokio::net::TcpListener;
use tokio_test::assert_ok;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Echoes the submitted code on stdout; `fail` writes to stderr instead.
struct EchoRunner;

#[async_trait]
impl CodeRunner for EchoRunner {
    async fn run(&self, code: &str) -> Result<ExecutionOutput, RunnerError> {
        if code == "fail" {
            return Ok(ExecutionOutput {
                stderr: "boom".into(),
                exit_code: Some(1),
                ..ExecutionOutput::default()
            });
        }
        Ok(ExecutionOutput {
            stdout: code.to_owned(),
            exit_code: Some(0),
            ..ExecutionOutput::default()
        })
    }
}

async fn spawn_engine() -> (SocketAddr, Arc<EngineState<EchoRunner>>) {
    let state = Arc::new(EngineState::new(EchoRunner));
    let app = create_engine_router(Arc::clone(&state));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        backend_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}"),
        retry: RetryPolicy::new(Duration::from_millis(20), 2),
    }
}

async fn next_frame<S>(socket: &mut S) -> InboundFrame
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match socket.next().await.unwrap().unwrap() {
            Message::Text(text) => match protocol::decode(&text) {
                Decoded::Frame(frame) => return frame,
                Decoded::Raw(raw) => panic!("unexpected raw frame: {raw}"),
            },
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_engine_protocol_over_raw_socket() {
    let (addr, state) = spawn_engine().await;
    let (mut socket, _) = connect_async(format!("ws://{addr}/ws/raw-session"))
        .await
        .unwrap();

    assert_eq!(
        next_frame(&mut socket).await,
        InboundFrame::Output("Execution environment ready".into())
    );
    assert_eq!(state.active_sessions().await, 1);

    socket
        .send(Message::Text(protocol::encode_execute("print(2)")))
        .await
        .unwrap();
    assert_eq!(
        next_frame(&mut socket).await,
        InboundFrame::Output("print(2)".into())
    );

    socket.send(Message::Text("not json".into())).await.unwrap();
    assert_eq!(
        next_frame(&mut socket).await,
        InboundFrame::Error("Invalid message format".into())
    );

    socket
        .send(Message::Binary(vec![0xff, 0xfe, b'{']))
        .await
        .unwrap();
    assert_eq!(
        next_frame(&mut socket).await,
        InboundFrame::Error("Invalid message format".into())
    );

    socket
        .send(Message::Binary(
            protocol::encode_execute("binary").into_bytes(),
        ))
        .await
        .unwrap();
    assert_eq!(
        next_frame(&mut socket).await,
        InboundFrame::Output("binary".into())
    );

    socket
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();
    assert_eq!(
        next_frame(&mut socket).await,
        InboundFrame::Error("Invalid message type".into())
    );

    socket
        .send(Message::Text(protocol::encode_execute("")))
        .await
        .unwrap();
    assert_eq!(
        next_frame(&mut socket).await,
        InboundFrame::Error("No code provided".into())
    );

    socket.close(None).await.unwrap();
    let released = tokio::time::timeout(Duration::from_secs(5), async {
        while state.active_sessions().await != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert_ok!(released);
}

#[tokio::test]
async fn test_console_runs_code_against_engine() {
    let (addr, _state) = spawn_engine().await;
    let console = SessionConsole::start(&config(addr), WsConnector::new());

    assert_ok!(console.wait_for(ConnectionStatus::is_connected).await);
    let mut output = console.output_stream();
    assert_eq!(
        output.next().await.as_deref(),
        Some("Execution environment ready")
    );

    assert_ok!(console.run_code("print('hi')").await);
    assert_eq!(output.next().await.as_deref(), Some(EXECUTING_MARKER));
    assert_eq!(output.next().await.as_deref(), Some("print('hi')"));

    assert_ok!(console.run_code("fail").await);
    assert_eq!(output.next().await.as_deref(), Some(EXECUTING_MARKER));
    assert_eq!(
        output.next().await,
        Some(format!("{ERROR_PREFIX}boom"))
    );
    assert_eq!(console.error().as_deref(), Some("boom"));

    console.shutdown().await;
}

#[tokio::test]
async fn test_console_gives_up_on_unreachable_engine() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let console = SessionConsole::start(&config(addr), WsConnector::new());
    let failed = assert_ok!(
        tokio::time::timeout(
            Duration::from_secs(10),
            console.wait_for(|s| s.state == ConnectionState::Failed),
        )
        .await
    );
    let failed = assert_ok!(failed);
    assert!(!failed.is_connected());
    assert_eq!(failed.retry_count, 2);
    assert_eq!(
        failed.error(),
        Some("Failed to connect to server after 2 attempts. Please retry the connection.")
    );
}
