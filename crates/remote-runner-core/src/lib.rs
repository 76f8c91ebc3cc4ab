//! Core abstractions for streamed remote code execution sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionId` - Process-lifetime session identity
//! - `protocol` - Frame codec for the duplex channel
//! - `OutputLog` - Append-only output history with live subscription
//! - `ConnectionState` / `ConnectionStatus` - Observable lifecycle state
//! - Channel and connector traits

pub mod error;
pub mod output_log;
pub mod protocol;
pub mod session;
pub mod state;
pub mod traits;

pub use error::ConnectionError;
pub use output_log::OutputLog;
pub use protocol::{Decoded, InboundFrame};
pub use session::SessionId;
pub use state::{ConnectionState, ConnectionStatus};
pub use traits::{
    Channel, ChannelCreationError, ChannelEvent, ChannelEvents, ChannelSendError, Connector,
    TaggedEvent,
};
