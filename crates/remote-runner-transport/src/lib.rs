//! WebSocket transport for remote runner clients and engines.
//!
//! Provides:
//! - WebSocket client connector (feature: client)
//! - Execution engine WebSocket endpoint (feature: server)

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
pub mod websocket;

#[cfg(feature = "client")]
pub use client::WsConnector;

#[cfg(feature = "server")]
pub use websocket::{EngineState, create_engine_router};
