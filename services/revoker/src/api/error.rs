use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rems_events::CorrelationId;
use serde::Serialize;

use crate::router::RouteError;

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    pub retryable: bool,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("urn:rems-revoker:problem:{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            code,
            correlation_id: None,
            retryable: false,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        let status = StatusCode::BAD_REQUEST;
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let mut problem = Box::new(ProblemDetails::new(status, code, message));
        problem.retryable = true;
        Self { status, problem }
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<CorrelationId>) -> Self {
        self.problem.correlation_id = correlation_id;
        self
    }
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        let correlation_id = err.correlation_id().cloned();
        let api_error = match &err {
            RouteError::Event(e) => ApiError::bad_request(e.code(), e.to_string()),
            RouteError::Discovery { .. } => {
                ApiError::internal("entitlement_discovery_failed", err.to_string())
            }
        };
        api_error.with_correlation_id(correlation_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::UpstreamError;
    use rems_events::EventError;
    use serde_json::json;

    #[test]
    fn test_event_errors_are_bad_requests() {
        let err = ApiError::from(RouteError::Event(EventError::MalformedPayload(
            "EOF while parsing".to_string(),
        )));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.problem.code, "malformed_payload");
        assert!(err.problem.correlation_id.is_none());
    }

    #[test]
    fn test_discovery_errors_are_internal() {
        let correlation_id = CorrelationId::from_value(&json!(3)).unwrap();
        let err = ApiError::from(RouteError::Discovery {
            correlation_id,
            source: UpstreamError::Status {
                status: 502,
                reason: "Bad Gateway".to_string(),
            },
        });
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);

        let body = serde_json::to_value(&err.problem).unwrap();
        assert_eq!(body["correlation_id"], "event/id:3");
        assert_eq!(body["code"], "entitlement_discovery_failed");
        assert_eq!(body["retryable"], true);
    }

    #[test]
    fn test_problem_content_type() {
        let response = ApiError::bad_request("invalid_event", "missing").into_response();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }
}
