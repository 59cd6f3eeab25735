//! HTML page scraper driven by per-source CSS selectors

use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::{
    collect_images, element_text, finalize_posts, fingerprint, normalize_lines, parse_date, resolve_url,
    HttpFetcher, ScrapeError, Scraper,
};
use crate::models::{HtmlSelectors, ScrapeStrategy, ScrapedPost, SocialSource};

/// Selectors compiled once per run
struct CompiledSelectors {
    item: Selector,
    title: Option<Selector>,
    link: Option<Selector>,
    content: Option<Selector>,
    image: Option<Selector>,
    date: Option<Selector>,
    id_attr: Option<String>,
}

impl CompiledSelectors {
    fn compile(selectors: &HtmlSelectors) -> Result<Self, ScrapeError> {
        Ok(Self {
            item: compile_one("item", &selectors.item)?,
            title: compile_opt("title", selectors.title.as_deref())?,
            link: compile_opt("link", selectors.link.as_deref())?,
            content: compile_opt("content", selectors.content.as_deref())?,
            image: compile_opt("image", selectors.image.as_deref())?,
            date: compile_opt("date", selectors.date.as_deref())?,
            id_attr: selectors
                .id_attr
                .as_ref()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
        })
    }
}

fn compile_one(field: &str, css: &str) -> Result<Selector, ScrapeError> {
    if css.trim().is_empty() {
        return Err(ScrapeError::Config(format!("selector '{}' is empty", field)));
    }
    Selector::parse(css).map_err(|e| ScrapeError::Config(format!("invalid '{}' selector '{}': {}", field, css, e)))
}

fn compile_opt(field: &str, css: Option<&str>) -> Result<Option<Selector>, ScrapeError> {
    match css {
        Some(css) if !css.trim().is_empty() => compile_one(field, css).map(Some),
        _ => Ok(None),
    }
}

pub struct HtmlScraper {
    fetcher: HttpFetcher,
    max_posts: usize,
}

impl HtmlScraper {
    pub fn new(fetcher: HttpFetcher, max_posts: usize) -> Self {
        Self { fetcher, max_posts }
    }

    /// Extract posts from a page fetched for `source`
    pub fn parse(source: &SocialSource, body: &str, max_posts: usize) -> Result<Vec<ScrapedPost>, ScrapeError> {
        let selectors = source
            .selectors
            .as_ref()
            .ok_or_else(|| ScrapeError::Config("html strategy requires selectors".to_string()))?;
        let compiled = CompiledSelectors::compile(selectors)?;
        let base = Url::parse(&source.url)
            .map_err(|e| ScrapeError::Config(format!("invalid source url '{}': {}", source.url, e)))?;

        let document = Html::parse_document(body);
        let posts = document
            .select(&compiled.item)
            .filter_map(|item| extract_post(item, &compiled, &base, &source.url))
            .collect();
        Ok(finalize_posts(posts, max_posts))
    }
}

#[async_trait]
impl Scraper for HtmlScraper {
    fn strategy(&self) -> ScrapeStrategy {
        ScrapeStrategy::Html
    }

    #[tracing::instrument(skip(self, source), fields(source = %source.key))]
    async fn scrape(&self, source: &SocialSource) -> Result<Vec<ScrapedPost>, ScrapeError> {
        let body = self.fetcher.fetch_text(&source.url).await?;
        let posts = Self::parse(source, &body, self.max_posts)?;
        tracing::debug!(count = posts.len(), "Parsed HTML page");
        Ok(posts)
    }
}

fn extract_post(
    item: ElementRef<'_>,
    selectors: &CompiledSelectors,
    base: &Url,
    page_url: &str,
) -> Option<ScrapedPost> {
    let title = selectors
        .title
        .as_ref()
        .and_then(|sel| item.select(sel).next())
        .map(|el| normalize_lines(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let content = match &selectors.content {
        Some(sel) => item.select(sel).next().map(element_text)?,
        None => element_text(item),
    };
    if content.is_empty() {
        return None;
    }

    // Fall back to the item itself when it is the anchor
    let link = match &selectors.link {
        Some(sel) => item.select(sel).next().and_then(|el| el.value().attr("href")),
        None => item.value().attr("href"),
    }
    .and_then(|href| resolve_url(base, href));

    let images = selectors
        .image
        .as_ref()
        .map(|sel| {
            collect_images(
                Some(base),
                item.select(sel).filter_map(|el| {
                    let value = el.value();
                    value.attr("src").or_else(|| value.attr("data-src"))
                }),
            )
        })
        .unwrap_or_default();

    let posted_at = selectors
        .date
        .as_ref()
        .and_then(|sel| item.select(sel).next())
        .and_then(|el| {
            el.value()
                .attr("datetime")
                .map(str::to_string)
                .or_else(|| Some(el.text().collect::<String>()))
        })
        .and_then(|raw| parse_date(&raw));

    let external_id = selectors
        .id_attr
        .as_deref()
        .and_then(|attr| item.value().attr(attr))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| link.clone())
        .unwrap_or_else(|| fingerprint(&content));

    Some(ScrapedPost {
        external_id,
        url: link.unwrap_or_else(|| page_url.to_string()),
        title,
        content,
        author: None,
        images,
        posted_at,
    })
}
