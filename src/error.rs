use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::store::Tier;

/// Unified error type for the session manager.
///
/// `Clone` so a single renewal outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    // ── Token Errors ────────────────────────────────────────────────────
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    // ── Renewal Errors ──────────────────────────────────────────────────
    #[error("Renewal failed: {0}")]
    RenewalNetworkFailure(String),

    #[error("Renewal rejected: {0}")]
    RenewalRejected(String),

    #[error("Session was logged out")]
    LoggedOut,

    // ── Storage Errors ──────────────────────────────────────────────────
    #[error("Storage write failed ({tier}): {message}")]
    StorageWriteFailure { tier: Tier, message: String },

    #[error("Storage write failed on every tier")]
    AllTiersFailed,

    #[error("Storage read failed: {0}")]
    StorageRead(String),

    // ── Transport ───────────────────────────────────────────────────────
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Errors that end the session when they come out of a renewal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionError::RenewalNetworkFailure(_)
                | SessionError::RenewalRejected(_)
                | SessionError::LoggedOut
        )
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        SessionError::Transport(e.to_string())
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(e: anyhow::Error) -> Self {
        SessionError::Internal(e.to_string())
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            SessionError::MalformedToken(_) => (StatusCode::BAD_REQUEST, "malformed_token"),
            SessionError::InvalidCredential(_) => (StatusCode::BAD_REQUEST, "invalid_credential"),
            SessionError::RenewalNetworkFailure(_) => (StatusCode::BAD_GATEWAY, "renewal_failed"),
            SessionError::RenewalRejected(_) => (StatusCode::UNAUTHORIZED, "renewal_rejected"),
            SessionError::LoggedOut => (StatusCode::UNAUTHORIZED, "logged_out"),
            SessionError::StorageWriteFailure { .. } | SessionError::AllTiersFailed => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
            SessionError::StorageRead(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            SessionError::Transport(_) => (StatusCode::BAD_GATEWAY, "transport_error"),
            SessionError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
