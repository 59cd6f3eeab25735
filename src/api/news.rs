//! Public news API endpoints
//!
//! Read-only: only published news whose publication time has passed is
//! visible here.

use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, ApiResponse, AppState};
use crate::models::{ListParams, News, PagedResult};

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct NewsListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default)]
    pub locale: Option<String>,
}

/// List view of a news record; the body is only returned by the detail route
#[derive(Debug, Serialize, Deserialize)]
pub struct NewsSummary {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub cover_image: Option<String>,
    pub locale: String,
    pub category: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source_url: Option<String>,
}

impl From<News> for NewsSummary {
    fn from(news: News) -> Self {
        Self {
            id: news.id,
            slug: news.slug,
            title: news.title,
            summary: news.summary,
            cover_image: news.cover_image,
            locale: news.locale,
            category: news.category,
            published_at: news.published_at,
            source_url: news.source_url,
        }
    }
}

/// GET /api/news
pub async fn list_news(
    State(state): State<AppState>,
    Query(query): Query<NewsListQuery>,
) -> Result<ApiResponse<PagedResult<NewsSummary>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    let locale = query.locale.as_deref().filter(|l| !l.is_empty());

    let page = state.news_service.list_published(&params, locale).await?;
    Ok(ApiResponse::ok(page.map(NewsSummary::from)))
}

/// GET /api/news/{slug}
pub async fn get_news(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<ApiResponse<News>, ApiError> {
    state
        .news_service
        .get_published_by_slug(&slug)
        .await?
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::not_found(format!("News not found: {}", slug)))
}
