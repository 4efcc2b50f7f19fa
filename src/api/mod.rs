//! Loopback API for a native host that talks HTTP instead of a message channel.
//!
//! Mounts under /v1/:
//! - /v1/status                Health check
//! - /v1/session               Current session state
//! - /v1/session/credential    Push a credential from the host's native login
//! - /v1/session/logout        End the session

pub mod routes;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::SessionManager;

pub fn router(session: SessionManager) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/v1", routes::v1_router(session))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
