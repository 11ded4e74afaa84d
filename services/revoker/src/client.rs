//! REMS API client for the revocation agent.
//!
//! Provides the two upstream operations the workflow needs:
//! - Listing a user's active entitlements to a resource
//! - Revoking an application
//!
//! Both are exposed through the [`RemsApi`] trait. [`RemsClient`] talks to a
//! real REMS instance; [`MockRemsApi`] is an in-memory double for tests and
//! local development.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

/// Header carrying the admin API key.
pub const API_KEY_HEADER: &str = "x-rems-api-key";

/// Header carrying the admin user id.
pub const USER_ID_HEADER: &str = "x-rems-user-id";

/// Comment attached to every revocation so handlers can see where it came from.
pub const REVOKE_COMMENT: &str =
    "Application revoked by auto-revoker after user added to deny list";

const ENTITLEMENTS_PATH: &str = "/api/entitlements";
const REVOKE_PATH: &str = "/api/applications/revoke";

/// Longest slice of an error body kept in an error reason.
const MAX_REASON_BODY: usize = 512;

/// Errors returned by the REMS API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// REMS answered with a non-200 status.
    #[error("response code {status} received. Reason: {reason}")]
    Status { status: u16, reason: String },

    /// REMS accepted the request but refused the command.
    #[error("command rejected by REMS: {0}")]
    Rejected(String),

    /// The request never got a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A 200 response whose body could not be decoded.
    #[error("unable to decode response: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// HTTP status REMS answered with, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Transport(e) => e.status().map(|s| s.as_u16()),
            UpstreamError::Rejected(_) | UpstreamError::Decode(_) => None,
        }
    }
}

/// Opaque REMS application identifier.
///
/// REMS uses integers, but the id is echoed back to the revoke endpoint in
/// whatever JSON form the listing returned it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApplicationId {
    Numeric(i64),
    Text(String),
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationId::Numeric(n) => write!(f, "{n}"),
            ApplicationId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ApplicationId {
    fn from(id: i64) -> Self {
        ApplicationId::Numeric(id)
    }
}

impl From<&str> for ApplicationId {
    fn from(id: &str) -> Self {
        ApplicationId::Text(id.to_string())
    }
}

impl From<String> for ApplicationId {
    fn from(id: String) -> Self {
        ApplicationId::Text(id)
    }
}

/// One active entitlement as listed by REMS.
///
/// Only the granting application is read; the other fields of a listing
/// entry are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementRecord {
    #[serde(rename = "application-id")]
    pub application_id: ApplicationId,
}

#[derive(Debug, Serialize)]
struct RevokeCommand<'a> {
    #[serde(rename = "application-id")]
    application_id: &'a ApplicationId,
    comment: &'a str,
    attachments: &'a [serde_json::Value],
}

/// Body REMS returns from command endpoints.
#[derive(Debug, Deserialize)]
struct CommandResponse {
    success: bool,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

/// Upstream operations used by the revocation workflow.
#[async_trait]
pub trait RemsApi: Send + Sync {
    /// List non-expired entitlements of `user_id` to `resource_id`.
    async fn list_active_entitlements(
        &self,
        user_id: &str,
        resource_id: &str,
    ) -> Result<Vec<EntitlementRecord>, UpstreamError>;

    /// Revoke a single application.
    async fn revoke_application(&self, application_id: &ApplicationId)
        -> Result<(), UpstreamError>;
}

/// REMS API client authenticated as a fixed admin user.
#[derive(Debug, Clone)]
pub struct RemsClient {
    client: reqwest::Client,
    base_url: String,
}

impl RemsClient {
    /// Create a new client from config.
    ///
    /// The admin headers are installed as default headers, so every request
    /// made through the shared connection pool is authenticated.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut api_key = HeaderValue::from_str(&config.admin_api_key)
            .context("REMS admin API key is not a valid header value")?;
        api_key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, api_key);
        headers.insert(
            USER_ID_HEADER,
            HeaderValue::from_str(&config.admin_user_id)
                .context("REMS admin user id is not a valid header value")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.upstream_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.rems_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build a URL for an endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RemsApi for RemsClient {
    async fn list_active_entitlements(
        &self,
        user_id: &str,
        resource_id: &str,
    ) -> Result<Vec<EntitlementRecord>, UpstreamError> {
        let url = self.url(ENTITLEMENTS_PATH);
        debug!(url = %url, user_id, resource_id, "Listing entitlements");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("user", user_id),
                ("resource", resource_id),
                ("expired", "false"),
            ])
            .send()
            .await?;

        let status = response.status();
        debug!(status = %status, "Entitlements response");
        if status != reqwest::StatusCode::OK {
            return Err(status_error(response).await);
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    async fn revoke_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<(), UpstreamError> {
        let url = self.url(REVOKE_PATH);
        debug!(url = %url, application_id = %application_id, "Revoking application");

        let command = RevokeCommand {
            application_id,
            comment: REVOKE_COMMENT,
            attachments: &[],
        };
        let response = self.client.post(&url).json(&command).send().await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(status_error(response).await);
        }

        // Older REMS versions answer with an empty body; only an explicit
        // `"success": false` counts as a refusal.
        let bytes = response.bytes().await?;
        if let Ok(body) = serde_json::from_slice::<CommandResponse>(&bytes) {
            if !body.success {
                let errors = body
                    .errors
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no error details".to_string());
                return Err(UpstreamError::Rejected(errors));
            }
        }

        Ok(())
    }
}

async fn status_error(response: reqwest::Response) -> UpstreamError {
    let status = response.status();
    let mut reason = status.canonical_reason().unwrap_or("Unknown").to_string();

    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    if !body.is_empty() {
        let cut = body
            .char_indices()
            .nth(MAX_REASON_BODY)
            .map(|(i, _)| i)
            .unwrap_or(body.len());
        reason.push_str(" - ");
        reason.push_str(&body[..cut]);
    }

    UpstreamError::Status {
        status: status.as_u16(),
        reason,
    }
}

/// An upstream call recorded by [`MockRemsApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamCall {
    ListEntitlements { user_id: String, resource_id: String },
    Revoke(ApplicationId),
}

/// Mock REMS API for testing and development.
#[derive(Debug, Default)]
pub struct MockRemsApi {
    /// Applications returned by the entitlement listing.
    entitlements: Vec<ApplicationId>,

    /// When set, the listing fails with this status.
    listing_status: Option<u16>,

    /// Applications whose revocation fails.
    failing: HashSet<ApplicationId>,

    calls: Mutex<Vec<UpstreamCall>>,
}

impl MockRemsApi {
    /// Create a mock with no entitlements.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose listing returns the given applications, in order.
    pub fn with_entitlements<I, A>(ids: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ApplicationId>,
    {
        Self {
            entitlements: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Create a mock whose listing fails with `status`.
    pub fn failing_listing(status: u16) -> Self {
        Self {
            listing_status: Some(status),
            ..Self::default()
        }
    }

    /// Make revocation of `id` fail.
    pub fn fail_revoke(mut self, id: impl Into<ApplicationId>) -> Self {
        self.failing.insert(id.into());
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<UpstreamCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Applications a revoke was attempted for, in order.
    pub fn revoke_calls(&self) -> Vec<ApplicationId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                UpstreamCall::Revoke(id) => Some(id),
                UpstreamCall::ListEntitlements { .. } => None,
            })
            .collect()
    }

    fn record(&self, call: UpstreamCall) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }
}

#[async_trait]
impl RemsApi for MockRemsApi {
    async fn list_active_entitlements(
        &self,
        user_id: &str,
        resource_id: &str,
    ) -> Result<Vec<EntitlementRecord>, UpstreamError> {
        self.record(UpstreamCall::ListEntitlements {
            user_id: user_id.to_string(),
            resource_id: resource_id.to_string(),
        });

        if let Some(status) = self.listing_status {
            return Err(UpstreamError::Status {
                status,
                reason: "[MOCK] listing failed".to_string(),
            });
        }

        Ok(self
            .entitlements
            .iter()
            .map(|id| EntitlementRecord {
                application_id: id.clone(),
            })
            .collect())
    }

    async fn revoke_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<(), UpstreamError> {
        self.record(UpstreamCall::Revoke(application_id.clone()));

        if self.failing.contains(application_id) {
            return Err(UpstreamError::Status {
                status: 422,
                reason: "[MOCK] revoke failed".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entitlement_deserialization() {
        let json = r#"[
            {
                "resource": "urn:nbn:fi:lb-123",
                "user": {"userid": "alice", "name": "Alice Applicant"},
                "application-id": 12,
                "start": "2024-01-01T00:00:00.000Z",
                "end": null,
                "mail": "alice@example.com"
            },
            {"application-id": "a2"}
        ]"#;

        let records: Vec<EntitlementRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].application_id, ApplicationId::Numeric(12));
        assert_eq!(records[1].application_id, ApplicationId::from("a2"));
    }

    #[test]
    fn test_entitlement_without_application_id_is_rejected() {
        let json = r#"[{"resource": "r1"}]"#;
        assert!(serde_json::from_str::<Vec<EntitlementRecord>>(json).is_err());
    }

    #[test]
    fn test_revoke_command_serialization() {
        let id = ApplicationId::Numeric(7);
        let command = RevokeCommand {
            application_id: &id,
            comment: REVOKE_COMMENT,
            attachments: &[],
        };

        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "application-id": 7,
                "comment": REVOKE_COMMENT,
                "attachments": []
            })
        );
    }

    #[test]
    fn test_url_building() {
        let config = crate::config::Config::from_lookup(|key| match key {
            "REMS_URL" => Some("http://rems.local/".to_string()),
            "REMS_ADMIN_USERID" => Some("owner".to_string()),
            "REMS_ADMIN_API_KEY" => Some("key".to_string()),
            _ => None,
        })
        .unwrap();
        let client = RemsClient::new(&config).unwrap();
        assert_eq!(client.url(REVOKE_PATH), "http://rems.local/api/applications/revoke");
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let api = MockRemsApi::with_entitlements(["a1", "a2"]).fail_revoke("a2");

        let records = api.list_active_entitlements("u1", "r1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(api.revoke_application(&"a1".into()).await.is_ok());
        assert!(api.revoke_application(&"a2".into()).await.is_err());

        assert_eq!(
            api.calls()[0],
            UpstreamCall::ListEntitlements {
                user_id: "u1".to_string(),
                resource_id: "r1".to_string()
            }
        );
        assert_eq!(
            api.revoke_calls(),
            vec![ApplicationId::from("a1"), ApplicationId::from("a2")]
        );
    }
}
