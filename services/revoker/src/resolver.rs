//! Entitlement discovery.

use std::collections::HashSet;
use std::sync::Arc;

use rems_events::{CorrelationId, EntitlementQuery};
use tracing::{info, warn};

use crate::client::{ApplicationId, RemsApi, UpstreamError};

/// Resolves a (user, resource) pair to the applications backing its active entitlements.
#[derive(Clone)]
pub struct EntitlementResolver {
    api: Arc<dyn RemsApi>,
}

impl EntitlementResolver {
    pub fn new(api: Arc<dyn RemsApi>) -> Self {
        Self { api }
    }

    /// Return the distinct application ids, in the order REMS listed them.
    ///
    /// Upstream errors are returned unchanged: without a listing there is
    /// nothing to revoke.
    pub async fn resolve(
        &self,
        query: &EntitlementQuery,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<ApplicationId>, UpstreamError> {
        info!(
            correlation_id = %correlation_id,
            user_id = %query.user_id,
            resource_id = %query.resource_id,
            "Retrieving entitlements"
        );

        let records = self
            .api
            .list_active_entitlements(&query.user_id, &query.resource_id)
            .await
            .inspect_err(|e| {
                warn!(
                    correlation_id = %correlation_id,
                    status = ?e.status(),
                    error = %e,
                    "Failure retrieving entitlements"
                );
            })?;

        let mut seen = HashSet::new();
        let application_ids: Vec<ApplicationId> = records
            .into_iter()
            .map(|record| record.application_id)
            .filter(|id| seen.insert(id.clone()))
            .collect();

        info!(
            correlation_id = %correlation_id,
            count = application_ids.len(),
            "Found applications with active entitlements"
        );

        Ok(application_ids)
    }
}
