//! Event notification endpoint.
//!
//! REMS is configured with this endpoint as an event notification target
//! and PUTs one event per request.

use axum::{extract::State, Json};
use bytes::Bytes;
use rems_events::CorrelationId;
use serde::Serialize;
use tracing::error;

use crate::api::error::ApiError;
use crate::router::EventRouter;

/// Response for a handled event.
#[derive(Debug, Serialize)]
pub struct EventHandled {
    pub correlation_id: CorrelationId,
    pub event_type: String,
    pub user_id: String,
    pub resource_id: String,
    pub revoked: usize,
}

/// Handle one event notification.
///
/// PUT /event
///
/// The body is taken as raw bytes so that unparsable JSON is reported
/// through the same problem format as every other validation failure.
pub async fn receive_event(
    State(router): State<EventRouter>,
    body: Bytes,
) -> Result<Json<EventHandled>, ApiError> {
    let outcome = router.route(&body).await.map_err(|e| {
        if !e.is_client_error() {
            error!(
                correlation_id = ?e.correlation_id().map(ToString::to_string),
                error = %e,
                "Error handling event"
            );
        }
        ApiError::from(e)
    })?;

    Ok(Json(EventHandled {
        correlation_id: outcome.correlation_id,
        event_type: outcome.event_kind.to_string(),
        user_id: outcome.query.user_id,
        resource_id: outcome.query.resource_id,
        revoked: outcome.revoked,
    }))
}
