use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use crate::bridge::ExternalCredential;
use crate::error::SessionError;
use crate::SessionManager;

// =============================================================================
// V1 Router
// =============================================================================

pub fn v1_router(session: SessionManager) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/session", get(session_status))
        .route("/session/credential", post(session_credential))
        .route("/session/logout", post(session_logout))
        .with_state(session)
}

// =============================================================================
// Health
// =============================================================================

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "storefront-session",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// Session
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionStatus {
    authenticated: bool,
    subject: Option<String>,
    expires_at: Option<i64>,
}

/// GET /v1/session: whether a live session exists. The body never exposes
/// tokens; the cookie-visible tier is mirrored into `Set-Cookie` headers.
async fn session_status(State(session): State<SessionManager>) -> impl IntoResponse {
    // Goes through the expiry check so a lapsed session ends the usual way.
    let record = if session.is_authenticated() {
        session.current_session()
    } else {
        None
    };

    let cookies = if record.is_some() {
        session.set_cookie_lines()
    } else {
        Vec::new()
    };

    (
        AppendHeaders(cookies.into_iter().map(|line| (header::SET_COOKIE, line))),
        Json(SessionStatus {
            authenticated: record.is_some(),
            subject: record.as_ref().and_then(|r| r.subject()),
            expires_at: record.map(|r| r.expires_at),
        }),
    )
}

/// POST /v1/session/credential: credential from the host's native login.
async fn session_credential(
    State(session): State<SessionManager>,
    Json(payload): Json<ExternalCredential>,
) -> Result<StatusCode, SessionError> {
    session.receive_external_credential(payload)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/session/logout
async fn session_logout(State(session): State<SessionManager>) -> StatusCode {
    session.logout().await;
    StatusCode::NO_CONTENT
}
