//! Connection lifecycle management for remote code execution sessions.
//!
//! Provides:
//! - `ConnectionManager` - Owns the channel and drives the reconnect state machine
//! - `RetryPolicy` - Fixed-delay, bounded reconnect policy
//! - `ClientConfig` - Environment-style endpoint configuration
//! - `SessionConsole` - Non-blocking adapter for presentation layers

pub mod config;
pub mod console;
pub mod manager;
pub mod policy;

#[cfg(test)]
mod testing;

pub use config::{ClientConfig, ConfigError};
pub use console::SessionConsole;
pub use manager::{ConnectionManager, ManagerEvent, ManagerInbox};
pub use policy::RetryPolicy;
