//! Social post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A post fetched from a social source and stored for review/conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialPost {
    pub id: i64,
    pub source_id: i64,
    /// Platform-side identifier, unique per source
    pub external_id: String,
    pub url: String,
    pub title: Option<String>,
    /// Plain text (or light markdown) body
    pub content: String,
    pub author: Option<String>,
    pub images: Vec<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    /// News record this post was promoted to
    pub news_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl SocialPost {
    pub fn is_converted(&self) -> bool {
        self.news_id.is_some()
    }
}

/// A post as produced by a scraper, before it is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPost {
    pub external_id: String,
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub author: Option<String>,
    pub images: Vec<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl ScrapedPost {
    pub fn new(external_id: impl Into<String>, url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            url: url.into(),
            title: None,
            content: content.into(),
            author: None,
            images: Vec::new(),
            posted_at: None,
        }
    }
}

/// Result of storing a scraped post
#[derive(Debug, Clone)]
pub struct UpsertedPost {
    pub post: SocialPost,
    /// `true` when the row did not exist before
    pub created: bool,
}
