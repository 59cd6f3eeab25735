//! Social scrapers
//!
//! A scraper turns one [`SocialSource`] into a list of [`ScrapedPost`]s. Two
//! strategies exist:
//! - [`JsonFeedScraper`] for JSON Feed documents, which RSS bridges emit for
//!   Weibo, WeChat official accounts, LinkedIn pages and most other platforms
//! - [`HtmlScraper`] for plain pages, driven by CSS selectors stored on the
//!   source
//!
//! Fetching and parsing are split so parsers can be tested on fixtures.

mod html;
mod json_feed;

pub use html::HtmlScraper;
pub use json_feed::JsonFeedScraper;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::Url;
use scraper::{ElementRef, Html, Node};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::models::{ScrapeStrategy, ScrapedPost, SocialSource};

/// Errors raised while fetching or parsing a source
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Source configuration cannot be used (bad selectors, bad URL)
    #[error("Invalid source configuration: {0}")]
    Config(String),

    #[error("No scraper registered for strategy '{0}'")]
    UnsupportedStrategy(ScrapeStrategy),
}

/// Fetches posts for one strategy
#[async_trait]
pub trait Scraper: Send + Sync {
    fn strategy(&self) -> ScrapeStrategy;

    async fn scrape(&self, source: &SocialSource) -> Result<Vec<ScrapedPost>, ScrapeError>;
}

/// Shared HTTP client used by the built-in scrapers
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &SchedulerConfig) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// GET `url` and return the body, failing on non-2xx responses
    pub async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Strategy to scraper lookup
#[derive(Clone, Default)]
pub struct ScraperRegistry {
    scrapers: HashMap<ScrapeStrategy, Arc<dyn Scraper>>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the JSON Feed and HTML scrapers sharing one client
    pub fn with_defaults(config: &SchedulerConfig) -> Result<Self, ScrapeError> {
        let fetcher = HttpFetcher::new(config)?;
        let limit = config.max_posts_per_run;
        let mut registry = Self::new();
        registry.register(Arc::new(JsonFeedScraper::new(fetcher.clone(), limit)));
        registry.register(Arc::new(HtmlScraper::new(fetcher, limit)));
        Ok(registry)
    }

    /// Add or replace the scraper for its strategy
    pub fn register(&mut self, scraper: Arc<dyn Scraper>) {
        self.scrapers.insert(scraper.strategy(), scraper);
    }

    pub fn get(&self, strategy: ScrapeStrategy) -> Result<Arc<dyn Scraper>, ScrapeError> {
        self.scrapers
            .get(&strategy)
            .cloned()
            .ok_or(ScrapeError::UnsupportedStrategy(strategy))
    }

    pub async fn scrape(&self, source: &SocialSource) -> Result<Vec<ScrapedPost>, ScrapeError> {
        self.get(source.strategy)?.scrape(source).await
    }
}

/// Drop posts without content, keep the first post per external id and cap
/// the list at `limit`.
pub(crate) fn finalize_posts(posts: Vec<ScrapedPost>, limit: usize) -> Vec<ScrapedPost> {
    let mut seen = HashSet::new();
    posts
        .into_iter()
        .filter(|post| !post.content.trim().is_empty())
        .filter(|post| seen.insert(post.external_id.clone()))
        .take(limit)
        .collect()
}

/// Stable id derived from the post body, for items without one
pub(crate) fn fingerprint(content: &str) -> String {
    let digest = Sha256::digest(content.trim().as_bytes());
    let hex: String = digest.iter().take(16).map(|b| format!("{:02x}", b)).collect();
    format!("sha256-{}", hex)
}

/// Resolve a possibly relative link against the page it was found on
pub(crate) fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    base.join(href).ok().map(|url| url.to_string())
}

/// Resolve image links against `base` and drop repeats, keeping the first
/// occurrence. Without a base, links are kept as they are.
pub(crate) fn collect_images<'a>(base: Option<&Url>, sources: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter_map(|src| match base {
            Some(base) => resolve_url(base, src),
            None => Some(src.trim().to_string()).filter(|src| !src.is_empty()),
        })
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Parse the date formats seen in feeds and on pages
pub(crate) fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Plain text of an HTML fragment with block elements on their own lines
pub(crate) fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    element_text(fragment.root_element())
}

const BLOCK_ELEMENTS: &[&str] = &[
    "br", "p", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "section",
    "article", "tr",
];

pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(text) => {
                let hidden = node
                    .parent()
                    .and_then(|parent| parent.value().as_element().map(|el| el.name()))
                    .map_or(false, |name| matches!(name, "script" | "style" | "noscript"));
                if !hidden {
                    out.push_str(text);
                }
            }
            Node::Element(el) if BLOCK_ELEMENTS.contains(&el.name()) => out.push('\n'),
            _ => {}
        }
    }
    normalize_lines(&out)
}

/// Collapse runs of whitespace inside lines and drop blank lines
pub(crate) fn normalize_lines(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
