//! Data models
//!
//! This module contains the data structures used throughout the site backend.
//! Models represent:
//! - Database entities (SocialSource, SocialPost, News, AnalyticsEvent)
//! - Scraper output and other internal data transfer objects
//! - Pagination types

mod analytics;
mod news;
mod social_post;
mod social_source;

pub use analytics::{AnalyticsEvent, AnalyticsEventInput};
pub use news::{ListParams, NewNews, News, NewsStatus, PagedResult};
pub use social_post::{ScrapedPost, SocialPost, UpsertedPost};
pub use social_source::{
    clamp_interval, HtmlSelectors, ScrapeStrategy, SocialPlatform, SocialSource, SocialSourceSeed, SyncState,
    SyncStatus, MAX_INTERVAL_MINUTES,
};
