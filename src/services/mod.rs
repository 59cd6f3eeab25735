//! Services layer - Business logic
//!
//! Services implement business rules on top of the repositories and the
//! cache. The social ingestion pipeline lives in [`crate::social`].

pub mod analytics;
pub mod markdown;
pub mod news;
pub mod rate_limiter;

pub use analytics::{AnalyticsError, AnalyticsService, ClientInfo, RecordOutcome};
pub use markdown::MarkdownRenderer;
pub use news::{generate_slug, NewsService, NewsServiceError};
pub use rate_limiter::IpRateLimiter;
