//! Revocation of discovered applications.
//!
//! Individual revocations may fail without affecting the others. Failures
//! are logged with the correlation id and application id; the caller only
//! learns how many revocations succeeded.

use std::sync::Arc;

use rems_events::CorrelationId;
use tracing::{info, warn};

use crate::client::{ApplicationId, RemsApi, UpstreamError};
use crate::config::RevocationPolicy;

/// Result of one revocation attempt.
#[derive(Debug)]
pub struct RevocationOutcome {
    pub application_id: ApplicationId,
    pub result: Result<(), UpstreamError>,
}

impl RevocationOutcome {
    pub fn is_revoked(&self) -> bool {
        self.result.is_ok()
    }
}

/// Drives applications through REMS revocation according to a policy.
#[derive(Clone)]
pub struct RevocationDriver {
    api: Arc<dyn RemsApi>,
    policy: RevocationPolicy,
}

impl RevocationDriver {
    pub fn new(api: Arc<dyn RemsApi>, policy: RevocationPolicy) -> Self {
        Self { api, policy }
    }

    pub fn policy(&self) -> RevocationPolicy {
        self.policy
    }

    /// Revoke `application_ids` and return how many succeeded.
    ///
    /// Calls are made one at a time, in order. Under
    /// [`RevocationPolicy::FirstOnly`] at most one call is made.
    pub async fn drive(
        &self,
        application_ids: &[ApplicationId],
        correlation_id: &CorrelationId,
    ) -> usize {
        let selected = match self.policy {
            RevocationPolicy::All => application_ids,
            RevocationPolicy::FirstOnly => &application_ids[..application_ids.len().min(1)],
        };

        let mut outcomes = Vec::with_capacity(selected.len());
        for application_id in selected {
            outcomes.push(self.attempt(application_id, correlation_id).await);
        }

        let revoked = outcomes.iter().filter(|o| o.is_revoked()).count();
        let failed: Vec<String> = outcomes
            .iter()
            .filter(|o| !o.is_revoked())
            .map(|o| o.application_id.to_string())
            .collect();
        if !failed.is_empty() {
            warn!(
                correlation_id = %correlation_id,
                revoked,
                failed = ?failed,
                "Some applications were not revoked"
            );
        }

        if selected.len() < application_ids.len() {
            info!(
                correlation_id = %correlation_id,
                remaining = application_ids.len() - selected.len(),
                policy = %self.policy,
                "Leaving remaining applications for a later event"
            );
        }

        revoked
    }

    async fn attempt(
        &self,
        application_id: &ApplicationId,
        correlation_id: &CorrelationId,
    ) -> RevocationOutcome {
        info!(
            correlation_id = %correlation_id,
            application_id = %application_id,
            "Revoking application"
        );

        let result = self.api.revoke_application(application_id).await;
        match &result {
            Ok(()) => info!(
                correlation_id = %correlation_id,
                application_id = %application_id,
                "Revoked application"
            ),
            Err(e) => warn!(
                correlation_id = %correlation_id,
                application_id = %application_id,
                error = %e,
                "Failure revoking application"
            ),
        }

        RevocationOutcome {
            application_id: application_id.clone(),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockRemsApi;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::io;
    use std::sync::Mutex;

    fn correlation_id() -> CorrelationId {
        CorrelationId::from_value(&json!("e1")).unwrap()
    }

    fn ids(raw: &[&str]) -> Vec<ApplicationId> {
        raw.iter().map(|s| ApplicationId::from(*s)).collect()
    }

    #[tokio::test]
    async fn test_all_policy_revokes_everything() {
        let api = Arc::new(MockRemsApi::new());
        let driver = RevocationDriver::new(api.clone(), RevocationPolicy::All);

        let revoked = driver.drive(&ids(&["a1", "a2", "a3"]), &correlation_id()).await;
        assert_eq!(revoked, 3);
        assert_eq!(api.revoke_calls(), ids(&["a1", "a2", "a3"]));
    }

    #[tokio::test]
    async fn test_all_policy_continues_after_failure() {
        let api = Arc::new(MockRemsApi::new().fail_revoke("a1"));
        let driver = RevocationDriver::new(api.clone(), RevocationPolicy::All);

        let revoked = driver.drive(&ids(&["a1", "a2"]), &correlation_id()).await;
        assert_eq!(revoked, 1);
        assert_eq!(api.revoke_calls(), ids(&["a1", "a2"]));
    }

    #[tokio::test]
    async fn test_first_only_policy() {
        let api = Arc::new(MockRemsApi::new());
        let driver = RevocationDriver::new(api.clone(), RevocationPolicy::FirstOnly);

        let revoked = driver.drive(&ids(&["a1", "a2", "a3"]), &correlation_id()).await;
        assert_eq!(revoked, 1);
        assert_eq!(api.revoke_calls(), ids(&["a1"]));
    }

    #[tokio::test]
    async fn test_first_only_policy_failure_returns_zero() {
        let api = Arc::new(MockRemsApi::new().fail_revoke("a1"));
        let driver = RevocationDriver::new(api.clone(), RevocationPolicy::FirstOnly);

        let revoked = driver.drive(&ids(&["a1", "a2"]), &correlation_id()).await;
        assert_eq!(revoked, 0);
        assert_eq!(api.revoke_calls(), ids(&["a1"]));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        for policy in [RevocationPolicy::All, RevocationPolicy::FirstOnly] {
            let api = Arc::new(MockRemsApi::new());
            let driver = RevocationDriver::new(api.clone(), policy);

            assert_eq!(driver.drive(&[], &correlation_id()).await, 0);
            assert!(api.calls().is_empty());
        }
    }

    fn run<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("failed to build runtime")
            .block_on(future)
    }

    /// Shared in-memory sink for formatted log lines.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn lines(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn find_line<'a>(lines: &'a [Value], message: &str, application_id: &str) -> &'a Value {
        lines
            .iter()
            .find(|l| {
                l["fields"]["message"] == message && l["fields"]["application_id"] == application_id
            })
            .unwrap_or_else(|| panic!("no '{message}' line for {application_id} in {lines:#?}"))
    }

    #[test]
    fn test_outcome_logs_carry_correlation_and_application_id() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();

        let revoked = tracing::subscriber::with_default(subscriber, || {
            let api = Arc::new(MockRemsApi::new().fail_revoke("a2"));
            let driver = RevocationDriver::new(api, RevocationPolicy::All);
            run(driver.drive(&ids(&["a1", "a2"]), &correlation_id()))
        });
        assert_eq!(revoked, 1);

        let lines = buffer.lines();

        let success = find_line(&lines, "Revoked application", "a1");
        assert_eq!(success["level"], "INFO");
        assert_eq!(success["fields"]["correlation_id"], "event/id:e1");

        let failure = find_line(&lines, "Failure revoking application", "a2");
        assert_eq!(failure["level"], "WARN");
        assert_eq!(failure["fields"]["correlation_id"], "event/id:e1");
        assert!(failure["fields"]["error"].is_string());

        let summary = lines
            .iter()
            .find(|l| l["fields"]["message"] == "Some applications were not revoked")
            .unwrap();
        assert_eq!(summary["fields"]["correlation_id"], "event/id:e1");
        assert_eq!(summary["fields"]["failed"], r#"["a2"]"#);
        assert_eq!(summary["fields"]["revoked"], 1);
    }

    proptest! {
        #[test]
        fn prop_all_policy_counts_successes(failures in proptest::collection::vec(any::<bool>(), 0..16)) {
            let all: Vec<ApplicationId> = (0..failures.len() as i64).map(ApplicationId::from).collect();
            let mut api = MockRemsApi::new();
            for (id, fails) in all.iter().zip(&failures) {
                if *fails {
                    api = api.fail_revoke(id.clone());
                }
            }
            let api = Arc::new(api);
            let driver = RevocationDriver::new(api.clone(), RevocationPolicy::All);

            let revoked = run(driver.drive(&all, &correlation_id()));
            let failed = failures.iter().filter(|f| **f).count();

            prop_assert_eq!(revoked, all.len() - failed);
            prop_assert_eq!(api.revoke_calls(), all);
        }

        #[test]
        fn prop_first_only_makes_at_most_one_call(
            failures in proptest::collection::vec(any::<bool>(), 0..16)
        ) {
            let all: Vec<ApplicationId> = (0..failures.len() as i64).map(ApplicationId::from).collect();
            let mut api = MockRemsApi::new();
            for (id, fails) in all.iter().zip(&failures) {
                if *fails {
                    api = api.fail_revoke(id.clone());
                }
            }
            let api = Arc::new(api);
            let driver = RevocationDriver::new(api.clone(), RevocationPolicy::FirstOnly);

            let revoked = run(driver.drive(&all, &correlation_id()));

            prop_assert!(revoked <= 1);
            prop_assert_eq!(api.revoke_calls().len(), all.len().min(1));
            let expected = usize::from(failures.first() == Some(&false));
            prop_assert_eq!(revoked, expected);
        }
    }
}
