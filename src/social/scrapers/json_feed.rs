//! JSON Feed scraper
//!
//! Reads version 1 and 1.1 JSON Feed documents. Bridges that mirror Weibo,
//! WeChat or LinkedIn accounts expose them, so this is the default strategy.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use super::{
    collect_images, finalize_posts, fingerprint, html_to_text, normalize_lines, parse_date, resolve_url,
    HttpFetcher, ScrapeError, Scraper,
};
use crate::models::{ScrapeStrategy, ScrapedPost, SocialSource};

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    /// JSON Feed ids are strings, but some bridges emit numbers
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    external_url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content_text: Option<String>,
    #[serde(default)]
    content_html: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    banner_image: Option<String>,
    #[serde(default)]
    date_published: Option<String>,
    #[serde(default)]
    date_modified: Option<String>,
    #[serde(default)]
    authors: Vec<FeedAuthor>,
    /// Version 1.0 single author
    #[serde(default)]
    author: Option<FeedAuthor>,
    #[serde(default)]
    attachments: Vec<FeedAttachment>,
}

#[derive(Debug, Deserialize)]
struct FeedAuthor {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedAttachment {
    url: String,
    #[serde(default)]
    mime_type: Option<String>,
}

pub struct JsonFeedScraper {
    fetcher: HttpFetcher,
    max_posts: usize,
}

impl JsonFeedScraper {
    pub fn new(fetcher: HttpFetcher, max_posts: usize) -> Self {
        Self { fetcher, max_posts }
    }

    /// Parse a feed body fetched for `source`
    pub fn parse(source: &SocialSource, body: &str, max_posts: usize) -> Result<Vec<ScrapedPost>, ScrapeError> {
        let feed: Feed = serde_json::from_str(body).map_err(|e| ScrapeError::Parse(format!("invalid JSON Feed: {}", e)))?;
        let base = Url::parse(&source.url).ok();

        let posts = feed
            .items
            .into_iter()
            .filter_map(|item| convert_item(item, base.as_ref(), &source.url))
            .collect();
        Ok(finalize_posts(posts, max_posts))
    }
}

#[async_trait]
impl Scraper for JsonFeedScraper {
    fn strategy(&self) -> ScrapeStrategy {
        ScrapeStrategy::JsonFeed
    }

    #[tracing::instrument(skip(self, source), fields(source = %source.key))]
    async fn scrape(&self, source: &SocialSource) -> Result<Vec<ScrapedPost>, ScrapeError> {
        let body = self.fetcher.fetch_text(&source.url).await?;
        let posts = Self::parse(source, &body, self.max_posts)?;
        tracing::debug!(count = posts.len(), "Parsed JSON Feed");
        Ok(posts)
    }
}

fn convert_item(item: FeedItem, base: Option<&Url>, fallback_url: &str) -> Option<ScrapedPost> {
    let content = item
        .content_text
        .as_deref()
        .map(normalize_lines)
        .filter(|text| !text.is_empty())
        .or_else(|| item.content_html.as_deref().map(html_to_text))
        .filter(|text| !text.is_empty())
        .or_else(|| item.summary.as_deref().map(normalize_lines))
        .filter(|text| !text.is_empty())?;

    let url = item
        .url
        .as_deref()
        .or(item.external_url.as_deref())
        .and_then(|href| match base {
            Some(base) => resolve_url(base, href),
            None => Some(href.to_string()),
        });

    let external_id = item
        .id
        .as_ref()
        .and_then(id_to_string)
        .or_else(|| url.clone())
        .unwrap_or_else(|| fingerprint(&content));

    let attachments = item
        .attachments
        .iter()
        .filter(|a| a.mime_type.as_deref().map_or(false, |m| m.starts_with("image/")))
        .map(|a| a.url.as_str());
    let images = collect_images(
        base,
        item.image
            .as_deref()
            .into_iter()
            .chain(item.banner_image.as_deref())
            .chain(attachments),
    );

    let author = item
        .authors
        .into_iter()
        .chain(item.author)
        .find_map(|a| a.name)
        .filter(|name| !name.trim().is_empty());

    let posted_at = item
        .date_published
        .as_deref()
        .or(item.date_modified.as_deref())
        .and_then(parse_date);

    Some(ScrapedPost {
        external_id,
        url: url.unwrap_or_else(|| fallback_url.to_string()),
        title: item.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        content,
        author,
        images,
        posted_at,
    })
}

fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SocialPlatform;
    use chrono::{TimeZone, Utc};

    fn source() -> SocialSource {
        SocialSource::new(
            "weibo-main".into(),
            "Weibo".into(),
            SocialPlatform::Weibo,
            ScrapeStrategy::JsonFeed,
            "https://bridge.example.com/weibo/123.json".into(),
        )
    }

    const FEED: &str = r#"{
        "version": "https://jsonfeed.org/version/1.1",
        "title": "Company Weibo",
        "items": [
            {
                "id": "4990001",
                "url": "https://weibo.com/123/4990001",
                "content_html": "<p>New product launch today!</p><p>See you there.</p>",
                "image": "https://img.example.com/a.jpg",
                "date_published": "2024-05-01T08:00:00+08:00",
                "authors": [{ "name": "Company" }]
            },
            {
                "id": 4990002,
                "url": "/123/4990002",
                "title": "  Quarterly results ",
                "content_text": "Revenue grew 20%.",
                "attachments": [
                    { "url": "https://img.example.com/chart.png", "mime_type": "image/png" },
                    { "url": "https://img.example.com/report.pdf", "mime_type": "application/pdf" }
                ]
            },
            { "id": "empty", "content_text": "   " },
            { "content_text": "No id or url" },
            { "id": "4990001", "content_text": "duplicate id" }
        ]
    }"#;

    #[test]
    fn test_parse_feed() {
        let posts = JsonFeedScraper::parse(&source(), FEED, 20).unwrap();
        assert_eq!(posts.len(), 3);

        let first = &posts[0];
        assert_eq!(first.external_id, "4990001");
        assert_eq!(first.content, "New product launch today!\nSee you there.");
        assert_eq!(first.images, vec!["https://img.example.com/a.jpg".to_string()]);
        assert_eq!(first.author.as_deref(), Some("Company"));
        assert_eq!(
            first.posted_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );

        let second = &posts[1];
        assert_eq!(second.external_id, "4990002");
        assert_eq!(second.url, "https://bridge.example.com/123/4990002");
        assert_eq!(second.title.as_deref(), Some("Quarterly results"));
        assert_eq!(second.images, vec!["https://img.example.com/chart.png".to_string()]);

        let third = &posts[2];
        assert!(third.external_id.starts_with("sha256-"));
        assert_eq!(third.url, source().url);
    }

    #[test]
    fn test_parse_resolves_relative_images() {
        let body = r#"{
            "items": [{
                "id": "1",
                "content_text": "Photos from the expo",
                "image": "/media/cover.jpg",
                "banner_image": "https://cdn.example.com/banner.jpg",
                "attachments": [
                    { "url": "/media/cover.jpg", "mime_type": "image/jpeg" },
                    { "url": "gallery/2.jpg", "mime_type": "image/jpeg" },
                    { "url": "https://cdn.example.com/banner.jpg", "mime_type": "image/jpeg" }
                ]
            }]
        }"#;
        let posts = JsonFeedScraper::parse(&source(), body, 20).unwrap();
        assert_eq!(
            posts[0].images,
            vec![
                "https://bridge.example.com/media/cover.jpg".to_string(),
                "https://cdn.example.com/banner.jpg".to_string(),
                "https://bridge.example.com/weibo/gallery/2.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_respects_limit() {
        let posts = JsonFeedScraper::parse(&source(), FEED, 1).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].external_id, "4990001");
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = JsonFeedScraper::parse(&source(), "<html>not json</html>", 20).unwrap_err();
        assert!(matches!(err, ScrapeError::Parse(_)));
    }

    #[test]
    fn test_parse_empty_feed() {
        let posts = JsonFeedScraper::parse(&source(), r#"{"version":"1","title":"x"}"#, 20).unwrap();
        assert!(posts.is_empty());
    }
}
