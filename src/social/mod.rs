//! Social media ingestion
//!
//! - [`scrapers`]: fetch posts from a source (JSON Feed or HTML page)
//! - [`converter`]: promote a stored post to a news record
//! - [`scheduler`]: poll sources periodically or on demand

pub mod converter;
pub mod scheduler;
pub mod scrapers;

pub use converter::{convert, ConvertError, PostConverter};
pub use scheduler::{JobStatus, SchedulerError, SchedulerStatus, SocialScheduler, SyncReport, SyncTrigger};
pub use scrapers::{HtmlScraper, HttpFetcher, JsonFeedScraper, ScrapeError, Scraper, ScraperRegistry};
