//! HTTP API handlers and routing.

pub mod error;
mod events;
mod health;

use axum::{routing::put, Router};
use tower_http::trace::TraceLayer;

use crate::router::EventRouter;

/// Path REMS delivers event notifications to.
pub const EVENT_PATH: &str = "/event";

/// Create the main API router with all routes and middleware.
///
/// The event router is the whole application state; it is cheap to clone.
/// Unknown paths answer 404 and other methods on the event path answer 405.
pub fn create_router(router: EventRouter) -> Router {
    Router::new()
        // Health endpoints
        .merge(health::routes())
        // Event notifications
        .route(EVENT_PATH, put(events::receive_event))
        // Middleware
        .layer(TraceLayer::new_for_http())
        // Application state
        .with_state(router)
}
