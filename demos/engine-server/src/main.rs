//! Execution engine server.
//!
//! Run with: cargo run -p engine-server
//!
//! Environment:
//! - `RUNNER_ENGINE_ADDR` - listen address (default `0.0.0.0:8000`)
//! - `ALLOWED_ORIGINS` - comma-separated CORS origins
//! - `RUNNER_INTERPRETER` - interpreter command line (default `python3 -`)
//! - `RUNNER_EXEC_TIMEOUT_SECS` - optional per-execution time limit

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::HeaderValue;
use remote_runner_executor::InterpreterRunner;
use remote_runner_transport::{EngineState, create_engine_router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ENV_ENGINE_ADDR: &str = "RUNNER_ENGINE_ADDR";
const ENV_ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
const DEFAULT_ENGINE_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let addr: SocketAddr = env_or(ENV_ENGINE_ADDR, DEFAULT_ENGINE_ADDR)
        .parse()
        .with_context(|| format!("invalid {ENV_ENGINE_ADDR}"))?;

    let runner = InterpreterRunner::from_env();
    tracing::info!(interpreter = %runner.command().base, "Using interpreter");

    let state = Arc::new(EngineState::new(runner));
    let app = create_engine_router(state)
        .layer(cors_layer(&env_or(ENV_ALLOWED_ORIGINS, DEFAULT_ALLOWED_ORIGINS)))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Engine listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Engine stopped");
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn cors_layer(origins: &str) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid origin {o:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
