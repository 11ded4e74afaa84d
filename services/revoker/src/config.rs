//! Configuration for the revocation agent.

use std::{str::FromStr, time::Duration};

use anyhow::{bail, Context, Result};
use rems_events::EventKind;

/// Which of the discovered applications get revoked for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevocationPolicy {
    /// Revoke every matching application.
    #[default]
    All,
    /// Revoke only the first matching application and rely on REMS
    /// re-emitting the triggering event to drain the rest.
    FirstOnly,
}

impl std::fmt::Display for RevocationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RevocationPolicy::All => write!(f, "all"),
            RevocationPolicy::FirstOnly => write!(f, "first"),
        }
    }
}

impl FromStr for RevocationPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(RevocationPolicy::All),
            "first" | "first_only" | "first-only" => Ok(RevocationPolicy::FirstOnly),
            other => bail!("unknown revocation policy '{other}' (expected 'all' or 'first')"),
        }
    }
}

/// Agent configuration (env-driven).
#[derive(Clone)]
pub struct Config {
    /// Host the event listener binds to (IP address or hostname).
    pub listen_host: String,

    /// Port the event listener binds to.
    pub listen_port: u16,

    /// REMS base URL (example: https://rems.example.org).
    pub rems_url: String,

    /// REMS user id the agent acts as.
    pub admin_user_id: String,

    /// API key for `admin_user_id`.
    pub admin_api_key: String,

    /// Revocation policy applied to every event.
    pub policy: RevocationPolicy,

    /// Event types the listener accepts.
    pub event_kinds: Vec<EventKind>,

    /// Timeout for each upstream request.
    pub upstream_timeout: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("listen_host", &self.listen_host)
            .field("listen_port", &self.listen_port)
            .field("rems_url", &self.rems_url)
            .field("admin_user_id", &self.admin_user_id)
            .field("admin_api_key", &"<redacted>")
            .field("policy", &self.policy)
            .field("event_kinds", &self.event_kinds)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .with_context(|| format!("Configuration error: missing key {key}"))
        };

        // Resolved at bind time, so hostnames and bare IPv6 addresses both work.
        let listen_host = lookup("REVOKER_LISTEN_HOST")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        if listen_host.is_empty() {
            bail!("REVOKER_LISTEN_HOST must not be empty");
        }
        let listen_port: u16 = lookup("REVOKER_LISTEN_PORT")
            .map(|v| v.parse())
            .transpose()
            .context("REVOKER_LISTEN_PORT must be a port number.")?
            .unwrap_or(8080);

        let rems_url = required("REMS_URL")?.trim_end_matches('/').to_string();
        let admin_user_id = required("REMS_ADMIN_USERID")?;
        let admin_api_key = required("REMS_ADMIN_API_KEY")?;

        let policy: RevocationPolicy = lookup("REVOKER_POLICY")
            .map(|v| v.parse())
            .transpose()
            .context("REVOKER_POLICY is invalid.")?
            .unwrap_or_default();

        let event_kinds = match lookup("REVOKER_EVENT_TYPES") {
            Some(list) => parse_event_kinds(&list)?,
            None => EventKind::ALL.to_vec(),
        };

        let timeout_secs: u64 = lookup("REVOKER_UPSTREAM_TIMEOUT_SECS")
            .map(|v| v.parse())
            .transpose()
            .context("REVOKER_UPSTREAM_TIMEOUT_SECS must be an integer (seconds).")?
            .unwrap_or(30);
        let upstream_timeout = Duration::from_secs(timeout_secs.max(1));

        let log_level = lookup("REVOKER_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            listen_host,
            listen_port,
            rems_url,
            admin_user_id,
            admin_api_key,
            policy,
            event_kinds,
            upstream_timeout,
            log_level,
        })
    }
}

fn parse_event_kinds(list: &str) -> Result<Vec<EventKind>> {
    let mut kinds = Vec::new();
    for tag in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let kind: EventKind = tag
            .parse()
            .with_context(|| format!("REVOKER_EVENT_TYPES contains unsupported type '{tag}'"))?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        bail!("REVOKER_EVENT_TYPES must name at least one event type");
    }
    Ok(kinds)
}
