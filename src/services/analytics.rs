//! Analytics ingestion
//!
//! Validates browser beacons, applies a per-IP budget and stores events with
//! a hashed client address.

use crate::db::repositories::AnalyticsRepository;
use crate::models::{AnalyticsEvent, AnalyticsEventInput};
use crate::services::rate_limiter::IpRateLimiter;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::sync::Arc;

const MAX_NAME_LEN: usize = 64;
const MAX_PATH_LEN: usize = 512;
const MAX_PROPERTIES_BYTES: usize = 4096;
const MAX_REFERRER_LEN: usize = 1024;
const MAX_USER_AGENT_LEN: usize = 512;

/// Error types for analytics ingestion
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// Input failed validation; one message per problem
    #[error("Invalid analytics event: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Too many analytics events from this client")]
    RateLimited,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Request metadata attached to an event
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

/// Outcome of [`AnalyticsService::record`]
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Stored(AnalyticsEvent),
    /// Analytics is disabled; the event was accepted and discarded
    Dropped,
}

pub struct AnalyticsService {
    repo: Arc<dyn AnalyticsRepository>,
    limiter: Arc<IpRateLimiter>,
    enabled: bool,
}

impl AnalyticsService {
    pub fn new(repo: Arc<dyn AnalyticsRepository>, limiter: Arc<IpRateLimiter>, enabled: bool) -> Self {
        Self {
            repo,
            limiter,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn limiter(&self) -> &Arc<IpRateLimiter> {
        &self.limiter
    }

    pub async fn record(
        &self,
        input: AnalyticsEventInput,
        client: ClientInfo,
    ) -> Result<RecordOutcome, AnalyticsError> {
        let issues = validate_event(&input);
        if !issues.is_empty() {
            return Err(AnalyticsError::Invalid(issues));
        }

        if let Some(ip) = client.ip {
            if !self.limiter.check_and_record(ip).await {
                tracing::debug!(%ip, "Analytics rate limit hit");
                return Err(AnalyticsError::RateLimited);
            }
        }

        if !self.enabled {
            return Ok(RecordOutcome::Dropped);
        }

        let event = AnalyticsEvent {
            id: 0,
            event_id: uuid::Uuid::new_v4().to_string(),
            name: input.name,
            path: input.path,
            locale: input.locale.filter(|l| !l.trim().is_empty()),
            referrer: input
                .referrer
                .filter(|r| !r.trim().is_empty())
                .map(|r| truncate(&r, MAX_REFERRER_LEN)),
            properties: input
                .properties
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            ip_hash: client.ip.map(hash_ip),
            user_agent: client.user_agent.map(|ua| truncate(&ua, MAX_USER_AGENT_LEN)),
            created_at: Utc::now(),
        };

        let stored = self.repo.insert(&event).await?;
        Ok(RecordOutcome::Stored(stored))
    }
}

fn validate_event(input: &AnalyticsEventInput) -> Vec<String> {
    let mut issues = Vec::new();

    let name_ok = !input.name.is_empty()
        && input.name.len() <= MAX_NAME_LEN
        && input
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | ':' | '-'));
    if !name_ok {
        issues.push(format!(
            "name must be 1-{} characters of a-z, 0-9, '_', '.', ':' or '-'",
            MAX_NAME_LEN
        ));
    }

    if !input.path.starts_with('/') || input.path.len() > MAX_PATH_LEN {
        issues.push(format!("path must start with '/' and be at most {} bytes", MAX_PATH_LEN));
    }

    if let Some(locale) = &input.locale {
        if locale.len() > 10 {
            issues.push("locale must be at most 10 characters".to_string());
        }
    }

    match &input.properties {
        None | Some(serde_json::Value::Null) => {}
        Some(value @ serde_json::Value::Object(_)) => {
            let size = serde_json::to_string(value).map(|s| s.len()).unwrap_or(usize::MAX);
            if size > MAX_PROPERTIES_BYTES {
                issues.push(format!("properties must serialize to at most {} bytes", MAX_PROPERTIES_BYTES));
            }
        }
        Some(_) => issues.push("properties must be a JSON object".to_string()),
    }

    issues
}

/// SHA-256 hex digest of the client address
pub fn hash_ip(ip: IpAddr) -> String {
    let digest = Sha256::digest(ip.to_string().as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn truncate(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
