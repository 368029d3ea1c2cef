use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use mxagent_core::AgentError;
use serde_json::json;
use tracing::warn;

use super::access::Access;

#[derive(Debug)]
pub enum ApiError {
    Forbidden(Access),
    /// Request rejected before it reached the gateway, e.g. a malformed body
    BadRequest(String),
    Agent(AgentError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl From<AgentError> for ApiError {
    fn from(error: AgentError) -> Self {
        ApiError::Agent(error)
    }
}

/// Status for every error kind. Read timeouts never get here: they are
/// rendered as the type's default value with 200.
pub fn status_of(error: &AgentError) -> StatusCode {
    match error {
        AgentError::NotFound(_) => StatusCode::NOT_FOUND,
        AgentError::InvalidValue(_)
        | AgentError::SchemaMismatch(_)
        | AgentError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
        AgentError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        AgentError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AgentError::ConnectionUnavailable(_) | AgentError::ConnectionLost(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AgentError::LicenseDenied(_) => StatusCode::FORBIDDEN,
        AgentError::Connector(_) => StatusCode::BAD_GATEWAY,
        AgentError::ListenerFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Forbidden(access) => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "forbidden",
                    "message": format!("{:?} access denied", access),
                })),
            )
                .into_response(),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "bad_request",
                    "message": message,
                })),
            )
                .into_response(),
            ApiError::Agent(error) => {
                let status = status_of(&error);
                if status.is_server_error() {
                    warn!(error = %error, status = status.as_u16(), "[REST] Request failed");
                }
                (
                    status,
                    Json(json!({
                        "error": error.kind(),
                        "message": error.to_string(),
                    })),
                )
                    .into_response()
            }
        }
    }
}
