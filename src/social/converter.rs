//! Social post to news conversion
//!
//! [`convert`] derives a news record from a stored post without touching the
//! database. [`PostConverter`] persists it, links the post to the new news
//! row and keeps conversion idempotent.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use std::sync::Arc;

use crate::db::repositories::{SocialPostRepository, SocialSourceRepository};
use crate::models::{NewNews, News, NewsStatus, SocialPost, SocialSource};
use crate::services::markdown::MarkdownRenderer;
use crate::services::news::{generate_slug, NewsService, NewsServiceError};

pub const TITLE_MAX_CHARS: usize = 80;
pub const SUMMARY_MAX_CHARS: usize = 200;
const SLUG_MAX_CHARS: usize = 96;
const NEWS_CATEGORY: &str = "social";

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("URL pattern is valid"));

/// Weibo style `#topic#` first, then `#tag`
static HASHTAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#[^#\s](?:[^#\n]{0,38}[^#\s])?#|#[\p{L}\p{N}_]+").expect("hashtag pattern is valid"));

/// Error types for post conversion
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Social post not found: {0}")]
    PostNotFound(i64),

    #[error("Social source not found: {0}")]
    SourceNotFound(i64),

    /// Carries the id of the existing news record
    #[error("Post already converted to news {0}")]
    AlreadyConverted(i64),

    #[error(transparent)]
    News(#[from] NewsServiceError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Build the news record for `post`. The slug is a base that still has to be
/// made unique.
pub fn convert(post: &SocialPost, source: &SocialSource, publish: bool, now: DateTime<Utc>) -> NewNews {
    let title = derive_title(post.title.as_deref(), &post.content, source.platform.label());
    let images: Vec<String> = post.images.iter().filter_map(|url| link_destination(url)).collect();
    let content = build_content(post, &images, source);
    let content_html = MarkdownRenderer::new().render(&content);

    let (status, published_at) = if publish {
        let at = post.posted_at.map_or(now, |posted| posted.min(now));
        (NewsStatus::Published, Some(at))
    } else {
        (NewsStatus::Draft, None)
    };

    NewNews {
        slug: base_slug(&title, post, source),
        title,
        summary: summarize(&post.content),
        content,
        content_html,
        cover_image: images.into_iter().next(),
        locale: source.locale.clone(),
        category: NEWS_CATEGORY.to_string(),
        status,
        published_at,
        source_url: Some(post.url.clone()),
        social_post_id: Some(post.id),
    }
}

/// News title for a post.
///
/// Uses the post title when present, else the first line of the body that
/// still has text once links and hashtags are removed.
pub fn derive_title(post_title: Option<&str>, content: &str, platform_label: &str) -> String {
    let explicit = post_title.map(collapse_whitespace).filter(|t| !t.is_empty());
    let title = explicit.or_else(|| {
        content
            .lines()
            .map(|line| {
                let line = URL_RE.replace_all(line, " ");
                let line = HASHTAG_RE.replace_all(&line, " ");
                collapse_whitespace(&line)
            })
            .find(|line| !line.is_empty())
    });

    match title {
        Some(title) => truncate_chars(&title, TITLE_MAX_CHARS),
        None => format!("{} update", platform_label),
    }
}

pub fn summarize(content: &str) -> String {
    truncate_chars(&collapse_whitespace(content), SUMMARY_MAX_CHARS)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut to `max` chars and append an ellipsis when anything was dropped
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((end, _)) => format!("{}…", s[..end].trim_end()),
    }
}

/// Normalized absolute URL that is safe inside a `<...>` link destination.
///
/// Parsing percent-encodes `<`, `>` and spaces and strips tabs and newlines.
/// Links that do not parse as absolute http(s) URLs are dropped.
fn link_destination(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn build_content(post: &SocialPost, images: &[String], source: &SocialSource) -> String {
    let mut content = post.content.trim().to_string();

    for image in images.iter().skip(1) {
        content.push_str(&format!("\n\n![](<{}>)", image));
    }

    let attribution = if source.locale.starts_with("zh") {
        format!("原文发布于{}", source.platform.label())
    } else {
        format!("Originally posted on {}", source.platform.label())
    };
    match link_destination(&post.url) {
        Some(url) => content.push_str(&format!("\n\n[{}](<{}>)", attribution, url)),
        None => content.push_str(&format!("\n\n{}", attribution)),
    }
    content
}

fn base_slug(title: &str, post: &SocialPost, source: &SocialSource) -> String {
    let slug = generate_slug(title);
    let slug = if slug.chars().any(|c| c.is_ascii_alphanumeric()) {
        slug
    } else {
        let id_part = generate_slug(&post.external_id);
        if id_part.is_empty() {
            format!("{}-{}", source.platform.as_str(), post.id)
        } else {
            format!("{}-{}", source.platform.as_str(), id_part)
        }
    };

    let mut slug: String = slug.chars().take(SLUG_MAX_CHARS).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Persists conversions
pub struct PostConverter {
    posts: Arc<dyn SocialPostRepository>,
    sources: Arc<dyn SocialSourceRepository>,
    news: Arc<NewsService>,
}

impl PostConverter {
    pub fn new(
        posts: Arc<dyn SocialPostRepository>,
        sources: Arc<dyn SocialSourceRepository>,
        news: Arc<NewsService>,
    ) -> Self {
        Self { posts, sources, news }
    }

    /// Convert a stored post by id. `publish` overrides the source's
    /// `auto_publish` flag.
    pub async fn promote(&self, post_id: i64, publish: Option<bool>) -> Result<News, ConvertError> {
        let post = self
            .posts
            .get_by_id(post_id)
            .await?
            .ok_or(ConvertError::PostNotFound(post_id))?;
        let source = self
            .sources
            .get_by_id(post.source_id)
            .await?
            .ok_or(ConvertError::SourceNotFound(post.source_id))?;
        self.promote_post(&post, &source, publish).await
    }

    pub async fn promote_post(
        &self,
        post: &SocialPost,
        source: &SocialSource,
        publish: Option<bool>,
    ) -> Result<News, ConvertError> {
        if let Some(news_id) = post.news_id {
            return Err(ConvertError::AlreadyConverted(news_id));
        }
        if let Some(existing) = self.news.get_by_social_post(post.id).await? {
            // Repair a link lost between the two writes of an earlier run
            self.posts.mark_converted(post.id, existing.id).await?;
            return Err(ConvertError::AlreadyConverted(existing.id));
        }

        let mut draft = convert(post, source, publish.unwrap_or(source.auto_publish), Utc::now());
        draft.slug = self.news.unique_slug(&draft.slug).await?;

        let news = match self.news.create(&draft).await {
            Ok(news) => news,
            Err(err) => {
                // A concurrent conversion of the same post wins the unique
                // social_post_id constraint
                if let Some(existing) = self.news.get_by_social_post(post.id).await? {
                    return Err(ConvertError::AlreadyConverted(existing.id));
                }
                return Err(err.into());
            }
        };

        if !self.posts.mark_converted(post.id, news.id).await? {
            tracing::warn!(post_id = post.id, news_id = news.id, "Post was linked to news concurrently");
        }
        self.news.invalidate_cache().await;

        tracing::info!(
            post_id = post.id,
            news_id = news.id,
            slug = %news.slug,
            status = news.status.as_str(),
            "Converted social post to news"
        );
        Ok(news)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::{SqlxNewsRepository, SqlxSocialPostRepository, SqlxSocialSourceRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{ScrapeStrategy, ScrapedPost, SocialPlatform};
    use chrono::Duration;
    use proptest::prelude::*;

    fn sample_source(platform: SocialPlatform, locale: &str, auto_publish: bool) -> SocialSource {
        let mut source = SocialSource::new(
            "src".into(),
            "Source".into(),
            platform,
            ScrapeStrategy::JsonFeed,
            "https://bridge.example.com/feed.json".into(),
        );
        source.id = 1;
        source.locale = locale.to_string();
        source.auto_publish = auto_publish;
        source
    }

    fn sample_post(content: &str) -> SocialPost {
        let now = Utc::now();
        SocialPost {
            id: 7,
            source_id: 1,
            external_id: "4990001".to_string(),
            url: "https://weibo.com/123/4990001".to_string(),
            title: None,
            content: content.to_string(),
            author: None,
            images: vec![
                "https://img.example.com/cover.jpg".to_string(),
                "https://img.example.com/second.jpg".to_string(),
            ],
            posted_at: Some(now - Duration::hours(2)),
            fetched_at: now,
            news_id: None,
            created_at: now,
        }
    }

    #[test]
    fn test_derive_title_strips_links_and_tags() {
        let title = derive_title(
            None,
            "https://t.cn/abc\n#新品发布# New robot arm ships today #robotics https://t.cn/xyz\nmore",
            "Weibo",
        );
        assert_eq!(title, "New robot arm ships today");
    }

    #[test]
    fn test_derive_title_prefers_post_title() {
        assert_eq!(derive_title(Some("  Big   news "), "body", "Weibo"), "Big news");
        assert_eq!(derive_title(Some("   "), "body", "Weibo"), "body");
    }

    #[test]
    fn test_derive_title_fallback() {
        assert_eq!(derive_title(None, "#tag# https://x.y/z", "LinkedIn"), "LinkedIn update");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("abc d", 4), "abc…");
        assert_eq!(truncate_chars("新品发布会", 2), "新品…");
    }

    #[test]
    fn test_convert_draft() {
        let source = sample_source(SocialPlatform::Weibo, "zh", false);
        let post = sample_post("New <b>robot</b> arm\nships today");
        let draft = convert(&post, &source, false, Utc::now());

        assert_eq!(draft.status, NewsStatus::Draft);
        assert!(draft.published_at.is_none());
        assert_eq!(draft.title, "New <b>robot</b> arm");
        assert_eq!(draft.slug, "new-b-robot-b-arm");
        assert_eq!(draft.cover_image.as_deref(), Some("https://img.example.com/cover.jpg"));
        assert_eq!(draft.social_post_id, Some(7));
        assert_eq!(draft.category, "social");
        assert!(draft.content.contains("原文发布于Weibo"));
        assert!(draft.content.contains("second.jpg"));
        assert!(!draft.content_html.contains("<b>"));
        assert!(draft.content_html.contains("href=\"https://weibo.com/123/4990001\""));
    }

    #[test]
    fn test_convert_publish_clamps_future_date() {
        let source = sample_source(SocialPlatform::Linkedin, "en", true);
        let now = Utc::now();
        let mut post = sample_post("Hello");
        post.posted_at = Some(now + Duration::days(1));

        let draft = convert(&post, &source, true, now);
        assert_eq!(draft.status, NewsStatus::Published);
        assert_eq!(draft.published_at, Some(now));
        assert!(draft.content.contains("Originally posted on LinkedIn"));

        post.posted_at = Some(now - Duration::days(1));
        let draft = convert(&post, &source, true, now);
        assert_eq!(draft.published_at, post.posted_at);
    }

    #[test]
    fn test_convert_escapes_link_destinations() {
        let source = sample_source(SocialPlatform::Weibo, "en", false);
        let mut post = sample_post("Expo recap");
        post.url = "https://weibo.com/123/49>90001\n[x](javascript:alert(1))".to_string();
        post.images = vec![
            "https://img.example.com/cover image.jpg".to_string(),
            "https://img.example.com/a>b.jpg".to_string(),
            "not a url".to_string(),
            "ftp://img.example.com/c.jpg".to_string(),
        ];

        let draft = convert(&post, &source, false, Utc::now());
        assert_eq!(draft.cover_image.as_deref(), Some("https://img.example.com/cover%20image.jpg"));
        assert!(draft.content.contains("![](<https://img.example.com/a%3Eb.jpg>)"));
        assert!(!draft.content.contains("not a url"));
        assert!(!draft.content.contains("ftp://"));

        // Every destination stays inside its angle brackets
        for line in draft.content.lines().filter(|l| l.contains("](<")) {
            let inner = &line[line.find("](<").unwrap() + 3..];
            assert_eq!(inner.matches('>').count(), 1, "line: {}", line);
            assert!(inner.ends_with(">)"));
        }
        assert!(draft
            .content_html
            .contains("href=\"https://weibo.com/123/49%3E90001"));
    }

    #[test]
    fn test_convert_drops_unparsable_source_link() {
        let source = sample_source(SocialPlatform::Linkedin, "en", false);
        let mut post = sample_post("Hello");
        post.url = "/relative/only".to_string();
        let draft = convert(&post, &source, false, Utc::now());
        assert!(draft.content.ends_with("\n\nOriginally posted on LinkedIn"));
    }

    #[test]
    fn test_non_ascii_title_falls_back_to_external_id_slug() {
        let source = sample_source(SocialPlatform::Weibo, "zh", false);
        let post = sample_post("新品发布会圆满结束");
        let draft = convert(&post, &source, false, Utc::now());
        assert_eq!(draft.slug, "weibo-4990001");
    }

    async fn setup() -> (PostConverter, Arc<dyn SocialPostRepository>, SocialSource) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let sources = SqlxSocialSourceRepository::boxed(pool.clone());
        let posts = SqlxSocialPostRepository::boxed(pool.clone());
        let news = Arc::new(NewsService::new(
            SqlxNewsRepository::boxed(pool),
            create_cache(&CacheConfig::default()),
        ));

        let source = sources
            .upsert_by_key(&sample_source(SocialPlatform::Weibo, "en", true))
            .await
            .unwrap();
        (PostConverter::new(posts.clone(), sources, news), posts, source)
    }

    #[tokio::test]
    async fn test_promote_is_idempotent() {
        let (converter, posts, source) = setup().await;
        let stored = posts
            .upsert(source.id, &ScrapedPost::new("p1", "https://weibo.com/p1", "Launch day"))
            .await
            .unwrap();

        let news = converter.promote(stored.post.id, None).await.unwrap();
        assert_eq!(news.slug, "launch-day");
        assert_eq!(news.status, NewsStatus::Published);
        assert_eq!(news.social_post_id, Some(stored.post.id));

        let post = posts.get_by_id(stored.post.id).await.unwrap().unwrap();
        assert_eq!(post.news_id, Some(news.id));

        match converter.promote(stored.post.id, None).await {
            Err(ConvertError::AlreadyConverted(id)) => assert_eq!(id, news.id),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_promote_unique_slugs_and_override() {
        let (converter, posts, source) = setup().await;
        let a = posts
            .upsert(source.id, &ScrapedPost::new("a", "https://weibo.com/a", "Same words"))
            .await
            .unwrap();
        let b = posts
            .upsert(source.id, &ScrapedPost::new("b", "https://weibo.com/b", "Same words"))
            .await
            .unwrap();

        let first = converter.promote(a.post.id, None).await.unwrap();
        let second = converter.promote(b.post.id, Some(false)).await.unwrap();
        assert_eq!(first.slug, "same-words");
        assert_eq!(second.slug, "same-words-2");
        assert_eq!(second.status, NewsStatus::Draft);
    }

    #[tokio::test]
    async fn test_promote_missing_post() {
        let (converter, _, _) = setup().await;
        assert!(matches!(
            converter.promote(999, None).await,
            Err(ConvertError::PostNotFound(999))
        ));
    }

    proptest! {
        #[test]
        fn title_is_bounded_and_nonempty(content in "\\PC{0,300}") {
            let title = derive_title(None, &content, "Weibo");
            prop_assert!(!title.is_empty());
            prop_assert!(title.chars().count() <= TITLE_MAX_CHARS + 1);
        }

        #[test]
        fn summary_is_bounded(content in "\\PC{0,600}") {
            let summary = summarize(&content);
            prop_assert!(summary.chars().count() <= SUMMARY_MAX_CHARS + 1);
            prop_assert!(!summary.contains('\n'));
        }
    }
}
