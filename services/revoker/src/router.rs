//! Event routing: validate an inbound event and run the revocation workflow for it.
//!
//! ```text
//! payload ─▶ Event::parse ─▶ EventKind lookup ─▶ extractor
//!                                                   │
//!                      count ◀─ RevocationDriver ◀─ EntitlementResolver
//! ```
//!
//! Nothing touches REMS until the event has been fully validated.

use std::sync::Arc;

use rems_events::{
    CorrelationId, EntitlementQuery, Event, EventError, EventKind, UNDEFINED_EVENT_TYPE,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{RemsApi, UpstreamError};
use crate::config::{Config, RevocationPolicy};
use crate::driver::RevocationDriver;
use crate::resolver::EntitlementResolver;

/// Errors that abort handling of an event.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The event itself is unusable. Caller-side.
    #[error(transparent)]
    Event(#[from] EventError),

    /// Entitlements could not be listed. Upstream-side.
    #[error("failure retrieving entitlements: {source}")]
    Discovery {
        correlation_id: CorrelationId,
        #[source]
        source: UpstreamError,
    },
}

impl RouteError {
    /// Whether the caller sent something invalid (as opposed to REMS failing).
    pub fn is_client_error(&self) -> bool {
        matches!(self, RouteError::Event(_))
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            RouteError::Event(e) => e.correlation_id(),
            RouteError::Discovery { correlation_id, .. } => Some(correlation_id),
        }
    }
}

/// Result of a successfully handled event.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub correlation_id: CorrelationId,
    pub event_kind: EventKind,
    pub query: EntitlementQuery,
    pub revoked: usize,
}

/// Routes events to their extractor and drives the revocation workflow.
///
/// The event-type table is fixed at construction.
#[derive(Clone)]
pub struct EventRouter {
    kinds: Arc<[EventKind]>,
    resolver: EntitlementResolver,
    driver: RevocationDriver,
}

impl EventRouter {
    /// Create a router accepting `kinds`.
    pub fn new(api: Arc<dyn RemsApi>, kinds: &[EventKind], policy: RevocationPolicy) -> Self {
        Self {
            kinds: kinds.into(),
            resolver: EntitlementResolver::new(api.clone()),
            driver: RevocationDriver::new(api, policy),
        }
    }

    /// Create a router from the agent configuration.
    pub fn from_config(api: Arc<dyn RemsApi>, config: &Config) -> Self {
        Self::new(api, &config.event_kinds, config.policy)
    }

    /// Event types this router accepts.
    pub fn kinds(&self) -> &[EventKind] {
        &self.kinds
    }

    pub fn policy(&self) -> RevocationPolicy {
        self.driver.policy()
    }

    /// Handle one raw event payload and return the number of revoked applications.
    pub async fn route(&self, raw: &[u8]) -> Result<RouteOutcome, RouteError> {
        let event = Event::parse(raw).inspect_err(|e| warn!(error = %e, "Rejected event"))?;
        let correlation_id = event.correlation_id().clone();
        debug!(correlation_id = %correlation_id, data = ?event.body(), "Event data");

        let kind = self.lookup(&event).inspect_err(|e| {
            warn!(correlation_id = %correlation_id, error = %e, "Rejected event");
        })?;
        info!(correlation_id = %correlation_id, event_type = %kind, "Received valid event notification");

        let query = kind.extract(&event).inspect_err(|e| {
            warn!(correlation_id = %correlation_id, error = %e, "Rejected event");
        })?;

        info!(
            correlation_id = %correlation_id,
            user_id = %query.user_id,
            resource_id = %query.resource_id,
            "Revoking entitlements"
        );

        let application_ids = self
            .resolver
            .resolve(&query, &correlation_id)
            .await
            .map_err(|source| RouteError::Discovery {
                correlation_id: correlation_id.clone(),
                source,
            })?;

        let revoked = self.driver.drive(&application_ids, &correlation_id).await;
        info!(
            correlation_id = %correlation_id,
            user_id = %query.user_id,
            resource_id = %query.resource_id,
            revoked,
            "Revoked entitlements"
        );

        Ok(RouteOutcome {
            correlation_id,
            event_kind: kind,
            query,
            revoked,
        })
    }

    fn lookup(&self, event: &Event) -> Result<EventKind, EventError> {
        let received = event.event_type().unwrap_or(UNDEFINED_EVENT_TYPE);
        self.kinds
            .iter()
            .copied()
            .find(|k| k.as_str() == received)
            .ok_or_else(|| EventError::UnrecognizedEventType {
                correlation_id: Some(event.correlation_id().clone()),
                received: received.to_string(),
                expected: self.kinds.iter().map(|k| k.as_str().to_string()).collect(),
            })
    }
}
