//! Health check endpoint

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::middleware::AppState;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the database does not answer
    pub status: String,
    pub database: String,
    pub scheduler_running: bool,
    pub version: String,
    pub uptime_seconds: u64,
    pub total_requests: u64,
}

/// GET /api/health
///
/// Always 200 so load balancers can read the body.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, database) = match state.pool.ping().await {
        Ok(()) => ("ok", "connected"),
        Err(e) => {
            tracing::warn!("Health check database ping failed: {:#}", e);
            ("degraded", "unavailable")
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        database: database.to_string(),
        scheduler_running: state.scheduler.is_running().await,
        version: APP_VERSION.to_string(),
        uptime_seconds: state.request_stats.uptime_seconds(),
        total_requests: state.request_stats.total_requests(),
    })
}
