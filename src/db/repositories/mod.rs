//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the persistence of one entity.

pub mod analytics;
pub mod news;
pub mod social_post;
pub mod social_source;

pub use analytics::{AnalyticsRepository, SqlxAnalyticsRepository};
pub use news::{NewsRepository, SqlxNewsRepository};
pub use social_post::{SocialPostRepository, SqlxSocialPostRepository};
pub use social_source::{SocialSourceRepository, SqlxSocialSourceRepository};
