//! Client configuration.

use remote_runner_core::SessionId;
use thiserror::Error;

use crate::RetryPolicy;

pub const ENV_BACKEND_URL: &str = "RUNNER_BACKEND_URL";
pub const ENV_WS_URL: &str = "RUNNER_WS_URL";

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const DEFAULT_WS_URL: &str = "ws://localhost:8000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must start with one of {expected:?}, got {value:?}")]
    InvalidScheme {
        var: &'static str,
        value: String,
        expected: &'static [&'static str],
    },
}

/// Endpoints and reconnect policy for a client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// HTTP base of the execution engine.
    pub backend_url: String,
    /// Duplex channel base of the execution engine.
    pub ws_url: String,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_owned(),
            ws_url: DEFAULT_WS_URL.to_owned(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load from process environment, falling back to localhost defaults.
    ///
    /// # Errors
    /// Returns error if a configured URL has the wrong scheme.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for each variable. Empty values count as unset.
    ///
    /// # Errors
    /// Returns error if a configured URL has the wrong scheme.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_owned())
        };

        let backend_url = read(ENV_BACKEND_URL, DEFAULT_BACKEND_URL);
        let ws_url = read(ENV_WS_URL, DEFAULT_WS_URL);

        check_scheme(ENV_BACKEND_URL, &backend_url, &["http://", "https://"])?;
        check_scheme(ENV_WS_URL, &ws_url, &["ws://", "wss://"])?;

        Ok(Self {
            backend_url,
            ws_url,
            retry: RetryPolicy::default(),
        })
    }

    /// Channel endpoint for `session_id`.
    #[must_use]
    pub fn endpoint(&self, session_id: &SessionId) -> String {
        session_id.endpoint(&self.ws_url)
    }
}

fn check_scheme(
    var: &'static str,
    value: &str,
    expected: &'static [&'static str],
) -> Result<(), ConfigError> {
    let lower = value.to_ascii_lowercase();
    if expected.iter().any(|scheme| lower.starts_with(scheme)) {
        Ok(())
    } else {
        Err(ConfigError::InvalidScheme {
            var,
            value: value.to_owned(),
            expected,
        })
    }
}
