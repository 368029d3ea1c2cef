//! Error taxonomy shared by every layer of the agent.
//!
//! Registries never let an error from one resource leak into another; each
//! variant here has a deterministic rendering in every gateway.

use std::time::Duration;

use thiserror::Error;

/// Failures raised by the canonical type system and the type bridges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// No projection exists between the two representations.
    #[error("unsupported conversion from {from} to {to}")]
    UnsupportedType { from: String, to: String },

    /// The runtime shape of a value does not match its declared type.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A keyed record does not match the map/table column schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl TypeError {
    pub fn unsupported(from: impl ToString, to: impl ToString) -> Self {
        Self::UnsupportedType {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidValue(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaMismatch(message.into())
    }
}

/// Agent-wide error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// Unknown resource, attribute or notification category
    #[error("not found: {0}")]
    NotFound(String),

    /// Connector declined to provide the requested feature
    #[error("feature unavailable: {0}")]
    Unsupported(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Reconnection attempts were exhausted
    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// Transport-level failure reported by a connector operation
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("listener failure: {0}")]
    ListenerFailure(String),

    #[error("license limit reached: {0}")]
    LicenseDenied(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Opaque back-end error
    #[error("connector error: {0}")]
    Connector(String),
}

impl AgentError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn connector(error: impl ToString) -> Self {
        Self::Connector(error.to_string())
    }

    /// Errors that mean the physical connection can no longer be trusted.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            AgentError::ConnectionLost(_) | AgentError::ConnectionUnavailable(_)
        )
    }

    /// Stable tag used by gateways when rendering the error.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::NotFound(_) => "not_found",
            AgentError::Unsupported(_) => "unsupported",
            AgentError::InvalidValue(_) => "invalid_value",
            AgentError::SchemaMismatch(_) => "schema_mismatch",
            AgentError::Timeout(_) => "timeout",
            AgentError::ConnectionUnavailable(_) => "connection_unavailable",
            AgentError::ConnectionLost(_) => "connection_lost",
            AgentError::ListenerFailure(_) => "listener_failure",
            AgentError::LicenseDenied(_) => "license_denied",
            AgentError::InvalidIdentifier(_) => "invalid_identifier",
            AgentError::Connector(_) => "connector",
        }
    }
}

impl From<TypeError> for AgentError {
    fn from(error: TypeError) -> Self {
        match error {
            TypeError::UnsupportedType { from, to } => {
                AgentError::Unsupported(format!("conversion from {} to {}", from, to))
            }
            TypeError::InvalidValue(message) => AgentError::InvalidValue(message),
            TypeError::SchemaMismatch(message) => AgentError::SchemaMismatch(message),
        }
    }
}

/// Result alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;
