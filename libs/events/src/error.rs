//! Error types for event validation.

use thiserror::Error;

use crate::CorrelationId;

/// Errors raised while validating an inbound event.
///
/// All variants are caused by the event's content, so none of them are
/// worth retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The payload is not valid JSON.
    #[error("unable to parse JSON payload: {0}")]
    MalformedPayload(String),

    /// The payload is JSON but lacks a required field.
    #[error("missing or invalid data: {reason}")]
    InvalidEvent {
        correlation_id: Option<CorrelationId>,
        reason: String,
    },

    /// No handler is registered for the event type.
    #[error("received illegal event type: {received}. Expected one of {expected:?}")]
    UnrecognizedEventType {
        correlation_id: Option<CorrelationId>,
        received: String,
        expected: Vec<String>,
    },
}

impl EventError {
    pub(crate) fn invalid(correlation_id: Option<&CorrelationId>, reason: impl Into<String>) -> Self {
        EventError::InvalidEvent {
            correlation_id: correlation_id.cloned(),
            reason: reason.into(),
        }
    }

    /// Correlation id of the offending event, when it got far enough to have one.
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            EventError::MalformedPayload(_) => None,
            EventError::InvalidEvent { correlation_id, .. }
            | EventError::UnrecognizedEventType { correlation_id, .. } => correlation_id.as_ref(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            EventError::MalformedPayload(_) => "malformed_payload",
            EventError::InvalidEvent { .. } => "invalid_event",
            EventError::UnrecognizedEventType { .. } => "unrecognized_event_type",
        }
    }
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::MalformedPayload(err.to_string())
    }
}
