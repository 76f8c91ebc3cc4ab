//! Connection-level error taxonomy.

use thiserror::Error;

/// Errors surfaced by a session connection.
///
/// Malformed inbound frames are deliberately absent: they decode to raw
/// output instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Failed to create connection: {0}")]
    ChannelCreationFailed(String),
    #[error("Connection error occurred: {0}")]
    ChannelError(String),
    #[error("Connection closed (code {code:?}): {reason}")]
    UnsolicitedClose { code: Option<u16>, reason: String },
    #[error("Failed to connect to server after {attempts} attempts. Please retry the connection.")]
    RetriesExhausted { attempts: u32 },
    #[error("Not connected to the server")]
    NotConnected,
    #[error("Failed to send code to server: {0}")]
    SendFailed(String),
    #[error("Session has been shut down")]
    SessionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            ConnectionError::NotConnected.to_string(),
            "Not connected to the server"
        );
        assert!(
            ConnectionError::RetriesExhausted { attempts: 5 }
                .to_string()
                .starts_with("Failed to connect to server after 5 attempts")
        );
    }
}
