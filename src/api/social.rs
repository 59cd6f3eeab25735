//! Admin API for the social pipeline
//!
//! Scheduler control, manual triggers, and post review and conversion.
//! Every route sits behind the admin token middleware.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::middleware::{ApiError, ApiResponse, AppState};
use crate::models::{ListParams, News, PagedResult, SocialPost, SocialSource, SyncStatus};
use crate::social::{SchedulerStatus, SyncReport};

/// Build the social admin router, nested under `/api/admin/social`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/start", post(start_scheduler))
        .route("/stop", post(stop_scheduler))
        .route("/sources", get(list_sources))
        .route("/sources/{id}/trigger", post(trigger_source))
        .route("/sources/{id}/reload", post(reload_source))
        .route("/posts", get(list_posts))
        .route("/posts/{id}/convert", post(convert_post))
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
pub struct PostListQuery {
    #[serde(default)]
    pub source_id: Option<i64>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConvertRequest {
    /// Publish immediately; defaults to the source's `auto_publish`
    #[serde(default)]
    pub publish: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SchedulerToggleResponse {
    pub running: bool,
    pub jobs: usize,
}

/// GET /api/admin/social/status
async fn get_status(State(state): State<AppState>) -> ApiResponse<SchedulerStatus> {
    ApiResponse::ok(state.scheduler.get_status().await)
}

/// POST /api/admin/social/start
async fn start_scheduler(State(state): State<AppState>) -> Result<ApiResponse<SchedulerToggleResponse>, ApiError> {
    let jobs = state.scheduler.start().await?;
    Ok(ApiResponse::ok(SchedulerToggleResponse { running: true, jobs }).with_message("Scheduler started"))
}

/// POST /api/admin/social/stop
async fn stop_scheduler(State(state): State<AppState>) -> ApiResponse<SchedulerToggleResponse> {
    let jobs = state.scheduler.stop().await;
    ApiResponse::ok(SchedulerToggleResponse { running: false, jobs }).with_message("Scheduler stopped")
}

/// GET /api/admin/social/sources
async fn list_sources(State(state): State<AppState>) -> Result<ApiResponse<Vec<SocialSource>>, ApiError> {
    let sources = state.source_repo.list().await.map_err(ApiError::internal_error)?;
    Ok(ApiResponse::ok(sources))
}

/// POST /api/admin/social/sources/{id}/trigger
///
/// A failed scrape is still a completed run: the report carries the error.
async fn trigger_source(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<SyncReport>, ApiError> {
    let report = state.scheduler.trigger_scraping(id).await?;
    let message = match report.status {
        SyncStatus::Failed => "Sync failed",
        _ => "Sync finished",
    };
    Ok(ApiResponse::ok(report).with_message(message))
}

/// POST /api/admin/social/sources/{id}/reload
async fn reload_source(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let scheduled = state.scheduler.reload_source(id).await?;
    Ok(ApiResponse::ok(json!({ "source_id": id, "scheduled": scheduled })))
}

/// GET /api/admin/social/posts
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<ApiResponse<PagedResult<SocialPost>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    let items = state
        .post_repo
        .list(query.source_id, params.offset(), params.limit())
        .await
        .map_err(ApiError::internal_error)?;
    let total = state
        .post_repo
        .count(query.source_id)
        .await
        .map_err(ApiError::internal_error)?;
    Ok(ApiResponse::ok(PagedResult::new(items, total, &params)))
}

/// POST /api/admin/social/posts/{id}/convert
///
/// The body is optional; an empty body uses the source defaults.
async fn convert_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<ApiResponse<News>, ApiError> {
    let request: ConvertRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ConvertRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::validation_error(format!("Invalid request body: {}", e)))?
    };

    let news = state.converter.promote(id, request.publish).await?;
    Ok(ApiResponse::ok(news).with_message("Post converted"))
}
