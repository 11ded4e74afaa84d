//! Event envelope - the common wrapper around every REMS event notification.

use serde::{de::DeserializeOwned, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::EventError;

/// Key holding the event identifier.
pub const EVENT_ID_KEY: &str = "event/id";

/// Key holding the event type tag.
pub const EVENT_TYPE_KEY: &str = "event/type";

/// Correlation id attached to every log line produced while handling an event.
///
/// Renders as `event/id:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Build a correlation id from the raw `event/id` value.
    ///
    /// REMS uses integer ids; string ids are accepted verbatim. Anything else
    /// (null, empty string, objects) yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// The bare event id, without the `event/id:` prefix.
    pub fn event_id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", EVENT_ID_KEY, self.0)
    }
}

impl Serialize for CorrelationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A single event notification.
///
/// Built once per inbound request and never mutated afterwards. The
/// type-specific body stays as JSON until an extractor asks for a typed
/// view of one of its keys.
#[derive(Debug, Clone)]
pub struct Event {
    correlation_id: CorrelationId,
    event_type: Option<String>,
    body: Map<String, Value>,
}

impl Event {
    /// Parse raw request bytes into an event.
    ///
    /// Fails with `MalformedPayload` if the bytes are not JSON, and with
    /// `InvalidEvent` if the `event/id` is missing.
    pub fn parse(raw: &[u8]) -> Result<Self, EventError> {
        let value: Value = serde_json::from_slice(raw)?;
        Self::from_value(value)
    }

    /// Build an event from an already-parsed JSON value.
    ///
    /// Only the correlation id is validated here so that it is available
    /// for every later error.
    pub fn from_value(value: Value) -> Result<Self, EventError> {
        let Value::Object(body) = value else {
            return Err(EventError::invalid(
                None,
                "event payload must be a JSON object",
            ));
        };

        let correlation_id = body
            .get(EVENT_ID_KEY)
            .and_then(CorrelationId::from_value)
            .ok_or_else(|| EventError::invalid(None, "missing or invalid event/id"))?;

        // Non-string types are kept in their JSON rendering so that the
        // rejection names what was actually sent.
        let event_type = match body.get(EVENT_TYPE_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };

        Ok(Self {
            correlation_id,
            event_type,
            body,
        })
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// The declared event type, if any.
    ///
    /// A missing, null or empty `event/type` is `None`.
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    /// Raw body, including the envelope keys.
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Deserialize the nested object stored under `key`.
    ///
    /// A missing key or a shape mismatch is reported as `InvalidEvent`
    /// carrying this event's correlation id.
    pub fn nested<T: DeserializeOwned>(&self, key: &str) -> Result<T, EventError> {
        let value = self
            .body
            .get(key)
            .ok_or_else(|| self.invalid(format!("missing field `{key}`")))?;

        T::deserialize(value).map_err(|e| self.invalid(format!("invalid `{key}`: {e}")))
    }

    /// Build an `InvalidEvent` error tagged with this event's correlation id.
    pub fn invalid(&self, reason: impl Into<String>) -> EventError {
        EventError::invalid(Some(&self.correlation_id), reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_parse_string_id() {
        let event = Event::parse(br#"{"event/id": "e1", "event/type": "blacklist.event/add"}"#)
            .unwrap();
        assert_eq!(event.correlation_id().to_string(), "event/id:e1");
        assert_eq!(event.correlation_id().event_id(), "e1");
        assert_eq!(event.event_type(), Some("blacklist.event/add"));
    }

    #[test]
    fn test_parse_numeric_id() {
        let event = Event::parse(br#"{"event/id": 42}"#).unwrap();
        assert_eq!(event.correlation_id().to_string(), "event/id:42");
        assert_eq!(event.event_type(), None);
    }

    #[rstest]
    #[case::number(json!(5), Some("5"))]
    #[case::boolean(json!(true), Some("true"))]
    #[case::array(json!(["blacklist.event/add"]), Some(r#"["blacklist.event/add"]"#))]
    #[case::null(json!(null), None)]
    #[case::empty(json!(""), None)]
    fn test_non_string_event_type(#[case] event_type: Value, #[case] expected: Option<&str>) {
        let event = Event::from_value(json!({"event/id": 1, "event/type": event_type})).unwrap();
        assert_eq!(event.event_type(), expected);
    }

    #[test]
    fn test_malformed_json() {
        let err = Event::parse(b"{not json").unwrap_err();
        assert!(matches!(err, EventError::MalformedPayload(_)));
        assert_eq!(err.correlation_id(), None);
    }

    #[rstest]
    #[case::missing(json!({"event/type": "blacklist.event/add"}))]
    #[case::null(json!({"event/id": null}))]
    #[case::empty(json!({"event/id": ""}))]
    #[case::object(json!({"event/id": {"nested": 1}}))]
    #[case::not_an_object(json!(["event/id", "e1"]))]
    fn test_missing_event_id(#[case] payload: Value) {
        let err = Event::from_value(payload).unwrap_err();
        assert!(matches!(err, EventError::InvalidEvent { correlation_id: None, .. }));
    }

    #[test]
    fn test_nested_missing_key_carries_correlation_id() {
        let event = Event::from_value(json!({"event/id": "e7"})).unwrap();
        let err = event.nested::<Value>("event/blacklist").unwrap_err();
        assert_eq!(err.correlation_id().map(ToString::to_string).as_deref(), Some("event/id:e7"));
        assert!(err.to_string().contains("event/blacklist"));
    }

    #[test]
    fn test_correlation_id_serializes_with_prefix() {
        let id = CorrelationId::from_value(&json!("abc")).unwrap();
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("event/id:abc"));
    }
}
