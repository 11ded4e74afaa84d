//! Event type definitions and their entitlement extractors.
//!
//! Each supported event type has a payload struct describing its nested
//! body and an extractor that turns it into an [`EntitlementQuery`].

use serde::Deserialize;

use crate::{Event, EventError};

// =============================================================================
// Event Type Constants
// =============================================================================

/// All supported event type names as constants.
pub mod event_types {
    pub const BLACKLIST_ADDED: &str = "blacklist.event/add";
    pub const APPLICATION_REVOKED: &str = "application.event/revoked";
}

/// Placeholder reported when an event carries no `event/type`.
pub const UNDEFINED_EVENT_TYPE: &str = "<UNDEFINED>";

// =============================================================================
// Entitlement Query
// =============================================================================

/// The (user, resource) pair whose active entitlements should be revoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementQuery {
    pub user_id: String,
    pub resource_id: String,
}

impl EntitlementQuery {
    /// Returns `None` if either identifier is blank.
    pub fn new(user_id: impl Into<String>, resource_id: impl Into<String>) -> Option<Self> {
        let user_id = user_id.into();
        let resource_id = resource_id.into();
        if user_id.trim().is_empty() || resource_id.trim().is_empty() {
            return None;
        }
        Some(Self {
            user_id,
            resource_id,
        })
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// A REMS user reference.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    pub userid: String,
}

/// A REMS catalogue resource reference.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRef {
    #[serde(rename = "resource/ext-id")]
    pub ext_id: String,
}

/// Body of `blacklist.event/add`, stored under `event/blacklist`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlacklistPayload {
    #[serde(rename = "blacklist/user")]
    pub user: UserRef,
    #[serde(rename = "blacklist/resource")]
    pub resource: ResourceRef,
}

/// Body of `application.event/revoked`, stored under `event/application`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationPayload {
    #[serde(rename = "application/applicant")]
    pub applicant: UserRef,
    #[serde(rename = "application/resources", default)]
    pub resources: Vec<ResourceRef>,
}

// =============================================================================
// Event Kinds
// =============================================================================

/// Extracts the entitlement query from an event of a known type.
pub type Extractor = fn(&Event) -> Result<EntitlementQuery, EventError>;

/// Event types the agent knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `blacklist.event/add`
    BlacklistAdded,
    /// `application.event/revoked`
    ApplicationRevoked,
}

impl EventKind {
    /// Every supported kind.
    pub const ALL: [EventKind; 2] = [EventKind::BlacklistAdded, EventKind::ApplicationRevoked];

    /// The `event/type` tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BlacklistAdded => event_types::BLACKLIST_ADDED,
            EventKind::ApplicationRevoked => event_types::APPLICATION_REVOKED,
        }
    }

    /// Look up a kind by its `event/type` tag.
    pub fn from_type(event_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == event_type)
    }

    /// The extractor registered for this kind.
    pub fn extractor(&self) -> Extractor {
        match self {
            EventKind::BlacklistAdded => extract_blacklist_added,
            EventKind::ApplicationRevoked => extract_application_revoked,
        }
    }

    /// Run this kind's extractor against `event`.
    pub fn extract(&self, event: &Event) -> Result<EntitlementQuery, EventError> {
        (self.extractor())(event)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_type(s.trim()).ok_or_else(|| EventError::UnrecognizedEventType {
            correlation_id: None,
            received: s.to_string(),
            expected: Self::ALL.iter().map(|k| k.as_str().to_string()).collect(),
        })
    }
}

fn query_or_invalid(
    event: &Event,
    user_id: String,
    resource_id: String,
) -> Result<EntitlementQuery, EventError> {
    EntitlementQuery::new(user_id, resource_id)
        .ok_or_else(|| event.invalid("user id and resource id must not be empty"))
}

/// `event/blacklist` → `blacklist/user.userid`, `blacklist/resource.resource/ext-id`.
fn extract_blacklist_added(event: &Event) -> Result<EntitlementQuery, EventError> {
    let payload: BlacklistPayload = event.nested("event/blacklist")?;
    query_or_invalid(event, payload.user.userid, payload.resource.ext_id)
}

/// `event/application` → applicant `userid` and the first resource's `resource/ext-id`.
fn extract_application_revoked(event: &Event) -> Result<EntitlementQuery, EventError> {
    let payload: ApplicationPayload = event.nested("event/application")?;
    let resource = payload
        .resources
        .into_iter()
        .next()
        .ok_or_else(|| event.invalid("`application/resources` is empty"))?;
    query_or_invalid(event, payload.applicant.userid, resource.ext_id)
}
