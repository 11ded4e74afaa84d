//! Health check endpoints.
//!
//! Neither probe contacts REMS.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::router::EventRouter;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status: always "ok" while the process serves requests.
    pub status: String,

    /// Service name.
    pub service: String,

    /// Service version.
    pub version: String,

    /// Current timestamp (ISO 8601).
    pub timestamp: String,

    /// Revocation policy in effect.
    pub policy: String,

    /// Event types accepted by the listener.
    pub event_types: Vec<String>,
}

/// Create health check routes.
pub fn routes() -> Router<EventRouter> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/livez", get(livez))
}

/// Basic health check - is the service running, and how is it configured?
async fn healthz(State(router): State<EventRouter>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "entitlement-revoker".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        policy: router.policy().to_string(),
        event_types: router.kinds().iter().map(ToString::to_string).collect(),
    })
}

/// Liveness check - returns 200 with an empty body.
async fn livez() -> impl IntoResponse {
    StatusCode::OK
}
