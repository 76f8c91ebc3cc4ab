//! Line-oriented console for a remote execution engine.
//!
//! Run with: cargo run -p runner-console
//!
//! Type code line by line and submit it with a single `.` on its own line.
//! Commands: `:retry`, `:status`, `:clear`, `:quit`.

use anyhow::Context;
use futures::StreamExt;
use remote_runner_core::{ConnectionState, ConnectionStatus};
use remote_runner_session::{ClientConfig, SessionConsole};
use remote_runner_transport::WsConnector;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interleave with program output.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let config = ClientConfig::from_env().context("invalid client configuration")?;
    let console = SessionConsole::start(&config, WsConnector::new());
    println!(
        "Session {} -> {}",
        console.session_id(),
        config.endpoint(&console.session_id())
    );

    let mut output = console.output_stream();
    let printer = tokio::spawn(async move {
        while let Some(line) = output.next().await {
            println!("{line}");
        }
    });

    let mut status = console.watch_status();
    let watcher = tokio::spawn(async move {
        let mut last = status.borrow_and_update().state;
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            if current.state != last {
                last = current.state;
                println!("[{}]", describe(&current));
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut buffer: Vec<String> = Vec::new();

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            ":quit" => break,
            ":retry" => console.retry_connection(),
            ":clear" => {
                buffer.clear();
                console.clear_error();
            }
            ":status" => println!("[{}]", describe(&console.status())),
            "." => {
                let code = buffer.join("\n");
                buffer.clear();
                if code.trim().is_empty() {
                    continue;
                }
                if let Err(e) = console.run_code(code).await {
                    println!("[{e}]");
                }
            }
            _ => buffer.push(line),
        }
    }

    console.shutdown().await;
    watcher.abort();
    printer.abort();
    Ok(())
}

fn describe(status: &ConnectionStatus) -> String {
    let label = match status.state {
        ConnectionState::Idle => "idle",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Open => "connected",
        ConnectionState::Closed => "closed",
        ConnectionState::RetryScheduled => "reconnecting",
        ConnectionState::Failed => "failed, use :retry",
    };
    match status.error() {
        Some(error) => format!("{label}: {error}"),
        None if status.retry_count > 0 => format!("{label} (attempt {})", status.retry_count),
        None => label.to_owned(),
    }
}
