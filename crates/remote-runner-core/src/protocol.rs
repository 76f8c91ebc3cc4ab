//! Wire protocol for the duplex execution channel.
//!
//! Frames are JSON objects tagged by `type`:
//! - client to engine: `{"type": "execute", "code": "..."}`
//! - engine to client: `{"type": "output" | "error", "content": "..."}`
//!
//! Payloads are opaque text and never reinterpreted.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Frame sent by the engine to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Program output.
    Output(String),
    /// Error reported by the engine.
    Error(String),
}

impl InboundFrame {
    /// Serialize to the wire format.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Output(content) => json!({ "type": "output", "content": content }),
            Self::Error(content) => json!({ "type": "error", "content": content }),
        }
        .to_string()
    }
}

/// Result of decoding an inbound payload.
///
/// Anything that is not a well-formed output or error frame comes back as
/// `Raw` with the original text, so it can be shown as output instead of
/// being dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Frame(InboundFrame),
    Raw(String),
}

/// Encode source code as an `execute` frame.
#[must_use]
pub fn encode_execute(code: &str) -> String {
    json!({ "type": "execute", "code": code }).to_string()
}

/// Decode a payload received from the engine.
#[must_use]
pub fn decode(text: &str) -> Decoded {
    match serde_json::from_str::<InboundFrame>(text) {
        Ok(frame) => Decoded::Frame(frame),
        Err(e) => {
            tracing::debug!("Treating unparseable frame as raw output: {e}");
            Decoded::Raw(text.to_owned())
        }
    }
}

/// Rejected execute request, as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Invalid message format")]
    InvalidFormat,
    #[error("Invalid message type")]
    InvalidType,
    #[error("No code provided")]
    EmptyCode,
}

/// Decode an `execute` request and return its code.
///
/// # Errors
/// Returns error if the payload is not JSON, is not an `execute` frame,
/// or carries no code.
pub fn decode_request(text: &str) -> Result<String, RequestError> {
    let value: Value = serde_json::from_str(text).map_err(|_| RequestError::InvalidFormat)?;

    if value.get("type").and_then(Value::as_str) != Some("execute") {
        return Err(RequestError::InvalidType);
    }

    match value.get("code").and_then(Value::as_str) {
        Some(code) if !code.is_empty() => Ok(code.to_owned()),
        _ => Err(RequestError::EmptyCode),
    }
}
