//! API middleware and shared HTTP types
//!
//! Contains:
//! - `AppState` shared by all handlers
//! - The JSON envelope (`ApiResponse`, `ApiError`)
//! - Admin token check for `/api/admin/*`
//! - Request statistics

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::db::repositories::{SocialPostRepository, SocialSourceRepository};
use crate::db::DynDatabasePool;
use crate::services::{AnalyticsError, AnalyticsService, NewsService, NewsServiceError};
use crate::social::{ConvertError, PostConverter, SchedulerError, SocialScheduler};

/// Cookie read when no `Authorization` header is present
pub const ADMIN_TOKEN_COOKIE: &str = "admin_token";

// ============================================================================
// Request Statistics
// ============================================================================

/// Request counters kept with atomics
pub struct RequestStats {
    total_requests: AtomicU64,
    total_response_time_us: AtomicU64,
    started: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Mean response time in microseconds, 0 before the first request
    pub fn avg_response_time_us(&self) -> f64 {
        match self.total_requests() {
            0 => 0.0,
            n => self.total_response_time_us.load(Ordering::Relaxed) as f64 / n as f64,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub news_service: Arc<NewsService>,
    pub analytics_service: Arc<AnalyticsService>,
    pub scheduler: SocialScheduler,
    pub converter: Arc<PostConverter>,
    pub source_repo: Arc<dyn SocialSourceRepository>,
    pub post_repo: Arc<dyn SocialPostRepository>,
    /// SHA-256 of the configured admin token; `None` locks the admin API
    pub admin_token_digest: Option<[u8; 32]>,
    /// Read client addresses from proxy headers instead of the socket peer
    pub trust_proxy_headers: bool,
    pub request_stats: Arc<RequestStats>,
}

pub fn token_digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

// ============================================================================
// Response Envelope
// ============================================================================

/// Success envelope: `{ "success": true, "data": ..., "message"?: ... }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Error envelope: `{ "success": false, "error": CODE, "message": ..., "details"?: ... }`
#[derive(Debug)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: impl Into<String>, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new("RATE_LIMIT", message)
    }

    /// Logs the cause and hides it from the client
    pub fn internal_error(cause: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {:#}", cause);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({
            "success": false,
            "error": self.code,
            "message": self.message,
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (status, Json(body)).into_response()
    }
}

impl From<NewsServiceError> for ApiError {
    fn from(err: NewsServiceError) -> Self {
        match err {
            NewsServiceError::NotFound(msg) => Self::not_found(msg),
            NewsServiceError::ValidationError(msg) => Self::validation_error(msg),
            NewsServiceError::DuplicateSlug(slug) => Self::conflict(format!("Slug already exists: {}", slug)),
            NewsServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::NotFound(_) => Self::not_found(err.to_string()),
            SchedulerError::AlreadyRunning(_) => Self::conflict(err.to_string()),
            SchedulerError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<ConvertError> for ApiError {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::PostNotFound(_) | ConvertError::SourceNotFound(_) => Self::not_found(err.to_string()),
            ConvertError::AlreadyConverted(news_id) => Self::with_details(
                "CONFLICT",
                err.to_string(),
                serde_json::json!({ "news_id": news_id }),
            ),
            ConvertError::News(e) => e.into(),
            ConvertError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::Invalid(issues) => Self::with_details(
                "VALIDATION_ERROR",
                "Invalid analytics event",
                serde_json::json!({ "issues": issues }),
            ),
            AnalyticsError::RateLimited => Self::rate_limited("Too many events, slow down"),
            AnalyticsError::InternalError(e) => Self::internal_error(e),
        }
    }
}

// ============================================================================
// Admin Authentication
// ============================================================================

/// Admin token from `Authorization: Bearer` or the admin cookie. The header
/// wins when both are present.
fn extract_admin_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_str) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    let cookie_str = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_str.split(';').find_map(|cookie| {
        cookie
            .trim()
            .strip_prefix(ADMIN_TOKEN_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::to_string)
    })
}

/// Compare digests without an early exit
fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Admin authorization middleware
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state
        .admin_token_digest
        .as_ref()
        .ok_or_else(|| ApiError::unauthorized("Admin API is disabled"))?;

    let token = extract_admin_token(request.headers())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing admin token"))?;

    if !digests_match(&token_digest(&token), expected) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request with invalid token");
        return Err(ApiError::unauthorized("Invalid admin token"));
    }

    Ok(next.run(request).await)
}

/// Request statistics middleware
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state.request_stats.record(start.elapsed().as_micros() as u64);
    response
}

// ============================================================================
// Tests
// ============================================================================
