use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection state - runtime only, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Never connected, aborted, or closed
    #[default]
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    /// Ready for operations
    Connected,
    /// An operation reported a transport failure
    Degraded,
    /// Re-establishing after a failure (single-flight)
    Reconnecting,
    /// Retry policy exhausted
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// States in which a connection attempt is running.
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
