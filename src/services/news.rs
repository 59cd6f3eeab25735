//! News service
//!
//! Read side of the news table for the public site plus the write path used
//! when a social post is promoted:
//! - Published listing and detail lookups, cached in the memory cache
//! - Slug generation and uniqueness
//! - Cache invalidation after writes

use crate::cache::{keys, CacheLayer, SharedCache};
use crate::db::repositories::NewsRepository;
use crate::models::{ListParams, NewNews, News, PagedResult};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// List pages go stale when scheduled news becomes visible, so they are kept
/// for at most this long regardless of the configured TTL.
const NEWS_LIST_MAX_TTL: Duration = Duration::from_secs(60);

/// Highest numeric suffix tried before giving up on a slug
const MAX_SLUG_SUFFIX: u32 = 1000;

/// Error types for news service operations
#[derive(Debug, thiserror::Error)]
pub enum NewsServiceError {
    #[error("News not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("News slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct NewsService {
    repo: Arc<dyn NewsRepository>,
    cache: SharedCache,
    cache_ttl: Duration,
}

impl NewsService {
    pub fn new(repo: Arc<dyn NewsRepository>, cache: SharedCache) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            repo,
            cache,
            cache_ttl,
        }
    }

    /// Published news visible now, newest first
    pub async fn list_published(
        &self,
        params: &ListParams,
        locale: Option<&str>,
    ) -> Result<PagedResult<News>, NewsServiceError> {
        if let Some(locale) = locale {
            validate_locale(locale)?;
        }

        let cache_key = keys::news_list(params.page, params.per_page, locale);
        if let Ok(Some(cached)) = self.cache.get::<PagedResult<News>>(&cache_key).await {
            return Ok(cached);
        }

        let now = Utc::now();
        let items = self
            .repo
            .list_published(now, locale, params.offset(), params.limit())
            .await?;
        let total = self.repo.count_published(now, locale).await?;
        let result = PagedResult::new(items, total, params);

        let ttl = self.cache_ttl.min(NEWS_LIST_MAX_TTL);
        if let Err(e) = self.cache.set(&cache_key, &result, ttl).await {
            tracing::warn!("Failed to cache news list: {:#}", e);
        }
        Ok(result)
    }

    /// A published news record by slug. Drafts, archived rows and rows
    /// scheduled in the future are reported as absent.
    pub async fn get_published_by_slug(&self, slug: &str) -> Result<Option<News>, NewsServiceError> {
        let cache_key = keys::news_slug(slug);
        if let Ok(Some(cached)) = self.cache.get::<News>(&cache_key).await {
            if cached.is_visible_at(Utc::now()) {
                return Ok(Some(cached));
            }
        }

        let news = match self.repo.get_by_slug(slug).await? {
            Some(news) if news.is_visible_at(Utc::now()) => news,
            _ => return Ok(None),
        };

        if let Err(e) = self.cache.set(&cache_key, &news, self.cache_ttl).await {
            tracing::warn!("Failed to cache news {}: {:#}", slug, e);
        }
        Ok(Some(news))
    }

    /// Any news record by id, regardless of status
    pub async fn get_by_id(&self, id: i64) -> Result<Option<News>, NewsServiceError> {
        Ok(self.repo.get_by_id(id).await?)
    }

    /// News created from the given social post
    pub async fn get_by_social_post(&self, social_post_id: i64) -> Result<Option<News>, NewsServiceError> {
        Ok(self.repo.get_by_social_post(social_post_id).await?)
    }

    /// Return `base` or the first free `base-N` (N starting at 2)
    pub async fn unique_slug(&self, base: &str) -> Result<String, NewsServiceError> {
        if base.is_empty() {
            return Err(NewsServiceError::ValidationError("Slug cannot be empty".to_string()));
        }
        if !self.repo.exists_by_slug(base).await? {
            return Ok(base.to_string());
        }
        for n in 2..=MAX_SLUG_SUFFIX {
            let candidate = format!("{}-{}", base, n);
            if !self.repo.exists_by_slug(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(NewsServiceError::DuplicateSlug(base.to_string()))
    }

    /// Insert a news record and drop cached news pages
    pub async fn create(&self, input: &NewNews) -> Result<News, NewsServiceError> {
        if input.title.trim().is_empty() {
            return Err(NewsServiceError::ValidationError("Title cannot be empty".to_string()));
        }
        if self.repo.exists_by_slug(&input.slug).await? {
            return Err(NewsServiceError::DuplicateSlug(input.slug.clone()));
        }

        let news = self.repo.create(input).await?;
        self.invalidate_cache().await;
        Ok(news)
    }

    pub async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(keys::NEWS_PATTERN).await {
            tracing::warn!("Failed to invalidate news cache: {:#}", e);
        }
    }
}

fn validate_locale(locale: &str) -> Result<(), NewsServiceError> {
    let valid = !locale.is_empty()
        && locale.len() <= 10
        && locale.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(NewsServiceError::ValidationError(format!("Invalid locale: {}", locale)))
    }
}

/// Generate a URL-friendly slug from a title
///
/// Lowercases ASCII, turns separators and ASCII punctuation into single
/// hyphens and keeps non-ASCII letters (e.g. CJK) as they are.
pub fn generate_slug(title: &str) -> String {
    let mut result = String::with_capacity(title.len());
    let mut prev_hyphen = true;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c.to_ascii_lowercase());
            prev_hyphen = false;
        } else if c.is_ascii() || c.is_whitespace() || !c.is_alphanumeric() {
            if !prev_hyphen {
                result.push('-');
                prev_hyphen = true;
            }
        } else {
            result.push(c);
            prev_hyphen = false;
        }
    }

    result.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::SqlxNewsRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::NewsStatus;
    use chrono::{DateTime, Duration as ChronoDuration};
    use proptest::prelude::*;

    async fn setup_test_service() -> NewsService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        NewsService::new(
            SqlxNewsRepository::boxed(pool),
            create_cache(&CacheConfig::default()),
        )
    }

    fn input(slug: &str, status: NewsStatus, published_at: Option<DateTime<Utc>>) -> NewNews {
        NewNews {
            slug: slug.to_string(),
            title: format!("Title {}", slug),
            summary: String::new(),
            content: "body".to_string(),
            content_html: "<p>body</p>".to_string(),
            cover_image: None,
            locale: "en".to_string(),
            category: "news".to_string(),
            status,
            published_at,
            source_url: None,
            social_post_id: None,
        }
    }

    #[tokio::test]
    async fn test_list_published_filters_and_pages() {
        let service = setup_test_service().await;
        let now = Utc::now();

        for i in 0..3 {
            service
                .create(&input(
                    &format!("p{}", i),
                    NewsStatus::Published,
                    Some(now - ChronoDuration::hours(i + 1)),
                ))
                .await
                .unwrap();
        }
        service
            .create(&input("future", NewsStatus::Published, Some(now + ChronoDuration::days(1))))
            .await
            .unwrap();
        service.create(&input("draft", NewsStatus::Draft, None)).await.unwrap();

        let page = service.list_published(&ListParams::new(1, 2), None).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages(), 2);
        let slugs: Vec<_> = page.items.iter().map(|n| n.slug.as_str()).collect();
        assert_eq!(slugs, vec!["p0", "p1"]);
    }

    #[tokio::test]
    async fn test_create_invalidates_list_cache() {
        let service = setup_test_service().await;
        let past = Utc::now() - ChronoDuration::minutes(5);

        let before = service.list_published(&ListParams::default(), None).await.unwrap();
        assert_eq!(before.total, 0);

        service
            .create(&input("fresh", NewsStatus::Published, Some(past)))
            .await
            .unwrap();

        let after = service.list_published(&ListParams::default(), None).await.unwrap();
        assert_eq!(after.total, 1);
    }

    #[tokio::test]
    async fn test_get_published_by_slug_hides_drafts_and_future() {
        let service = setup_test_service().await;
        let now = Utc::now();

        service
            .create(&input("live", NewsStatus::Published, Some(now - ChronoDuration::minutes(1))))
            .await
            .unwrap();
        service
            .create(&input("later", NewsStatus::Published, Some(now + ChronoDuration::hours(1))))
            .await
            .unwrap();
        service.create(&input("draft", NewsStatus::Draft, None)).await.unwrap();

        assert!(service.get_published_by_slug("live").await.unwrap().is_some());
        assert!(service.get_published_by_slug("later").await.unwrap().is_none());
        assert!(service.get_published_by_slug("draft").await.unwrap().is_none());
        assert!(service.get_published_by_slug("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_slug_suffixes() {
        let service = setup_test_service().await;
        assert_eq!(service.unique_slug("launch").await.unwrap(), "launch");

        service.create(&input("launch", NewsStatus::Draft, None)).await.unwrap();
        assert_eq!(service.unique_slug("launch").await.unwrap(), "launch-2");

        service.create(&input("launch-2", NewsStatus::Draft, None)).await.unwrap();
        assert_eq!(service.unique_slug("launch").await.unwrap(), "launch-3");
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_slug() {
        let service = setup_test_service().await;
        service.create(&input("dup", NewsStatus::Draft, None)).await.unwrap();
        let err = service.create(&input("dup", NewsStatus::Draft, None)).await.unwrap_err();
        assert!(matches!(err, NewsServiceError::DuplicateSlug(_)));
    }

    #[tokio::test]
    async fn test_invalid_locale_rejected() {
        let service = setup_test_service().await;
        let err = service
            .list_published(&ListParams::default(), Some("en/../../x"))
            .await
            .unwrap_err();
        assert!(matches!(err, NewsServiceError::ValidationError(_)));
    }

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("  Q3 results: +20%!  "), "q3-results-20");
        assert_eq!(generate_slug("新品发布 Launch"), "新品发布-launch");
        assert_eq!(generate_slug("—"), "");
        assert_eq!(generate_slug(""), "");
    }

    proptest! {
        #[test]
        fn slug_has_no_edge_or_double_hyphens(title in "\\PC{0,60}") {
            let slug = generate_slug(&title);
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(!slug.chars().any(|c| c.is_ascii_uppercase() || c.is_whitespace()));
        }
    }
}
