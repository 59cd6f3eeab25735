//! Analytics event model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored analytics beacon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: i64,
    pub event_id: String,
    pub name: String,
    pub path: String,
    pub locale: Option<String>,
    pub referrer: Option<String>,
    pub properties: serde_json::Value,
    /// SHA-256 of the client address, never the address itself
    pub ip_hash: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Event payload sent by the browser
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsEventInput {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub properties: Option<serde_json::Value>,
}
