//! News model
//!
//! This module provides:
//! - `News` entity for news articles shown on the public site
//! - `NewsStatus` enum for publication states
//! - `NewNews` input used when inserting a record
//! - Pagination types for list queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// News entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct News {
    pub id: i64,
    /// URL-friendly slug
    pub slug: String,
    pub title: String,
    /// Plain text teaser
    pub summary: String,
    /// Markdown source
    pub content: String,
    /// Rendered HTML content
    pub content_html: String,
    pub cover_image: Option<String>,
    pub locale: String,
    pub category: String,
    pub status: NewsStatus,
    pub published_at: Option<DateTime<Utc>>,
    /// Original location when the news was imported from a social post
    pub source_url: Option<String>,
    pub social_post_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl News {
    /// Visible on the public site at `now`
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.status == NewsStatus::Published && self.published_at.map_or(false, |at| at <= now)
    }
}

/// News publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NewsStatus {
    /// Not visible to public
    #[default]
    Draft,
    /// Visible once `published_at` has passed
    Published,
    /// Hidden but not deleted
    Archived,
}

impl NewsStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsStatus::Draft => "draft",
            NewsStatus::Published => "published",
            NewsStatus::Archived => "archived",
        }
    }

    /// Parse status from database string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(NewsStatus::Draft),
            "published" => Some(NewsStatus::Published),
            "archived" => Some(NewsStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for NewsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for inserting a news record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNews {
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub content_html: String,
    pub cover_image: Option<String>,
    pub locale: String,
    pub category: String,
    pub status: NewsStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub source_url: Option<String>,
    pub social_post_id: Option<i64>,
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    /// Create new pagination parameters
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    /// Get the limit for database queries
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    /// Items in the current page
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    /// Create a new paginated result
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    /// Calculate the total number of pages
    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        ((self.total as u64 + self.per_page as u64 - 1) / self.per_page as u64) as u32
    }

    /// Transform the items while keeping the pagination data
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn sample(status: NewsStatus, published_at: Option<DateTime<Utc>>) -> News {
        let now = Utc::now();
        News {
            id: 1,
            slug: "s".into(),
            title: "t".into(),
            summary: String::new(),
            content: String::new(),
            content_html: String::new(),
            cover_image: None,
            locale: "en".into(),
            category: "news".into(),
            status,
            published_at,
            source_url: None,
            social_post_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_visibility() {
        let now = Utc::now();
        assert!(sample(NewsStatus::Published, Some(now - Duration::minutes(1))).is_visible_at(now));
        assert!(!sample(NewsStatus::Published, Some(now + Duration::minutes(1))).is_visible_at(now));
        assert!(!sample(NewsStatus::Published, None).is_visible_at(now));
        assert!(!sample(NewsStatus::Draft, Some(now)).is_visible_at(now));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(NewsStatus::parse("Published"), Some(NewsStatus::Published));
        assert_eq!(NewsStatus::parse("gone"), None);
    }

    #[test]
    fn test_list_params_clamp() {
        let params = ListParams::new(0, 1000);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
        assert_eq!(params.offset(), 0);
        assert_eq!(ListParams::new(3, 20).offset(), 40);
    }

    proptest! {
        #[test]
        fn total_pages_covers_all_items(total in 0i64..10_000, per_page in 1u32..=100) {
            let params = ListParams::new(1, per_page);
            let paged: PagedResult<()> = PagedResult::new(Vec::new(), total, &params);
            let pages = paged.total_pages() as i64;
            prop_assert!(pages * per_page as i64 >= total);
            prop_assert!(pages == 0 || (pages - 1) * (per_page as i64) < total);
        }
    }
}
