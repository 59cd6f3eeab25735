//! Analytics event ingestion endpoint

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    Json,
};
use serde_json::json;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use crate::api::middleware::{ApiError, ApiResponse, AppState};
use crate::models::AnalyticsEventInput;
use crate::services::{ClientInfo, RecordOutcome};

/// Client address: the socket peer when the server was started with connect
/// info. With `trust_proxy_headers` the first `X-Forwarded-For` hop or
/// `X-Real-IP` wins over the peer.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(client_ip(&parts.headers, peer, state.trust_proxy_headers)))
    }
}

fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy_headers: bool) -> Option<IpAddr> {
    if trust_proxy_headers {
        forwarded_ip(headers).or(peer)
    } else {
        peer
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());
    forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

/// POST /api/analytics/events
pub async fn record_event(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    body: Result<Json<AnalyticsEventInput>, JsonRejection>,
) -> Result<(StatusCode, ApiResponse<serde_json::Value>), ApiError> {
    let Json(input) = body.map_err(|e| ApiError::validation_error(e.body_text()))?;

    let client = ClientInfo {
        ip,
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let data = match state.analytics_service.record(input, client).await? {
        RecordOutcome::Stored(event) => json!({ "stored": true, "event_id": event.event_id }),
        RecordOutcome::Dropped => json!({ "stored": false }),
    };
    Ok((StatusCode::ACCEPTED, ApiResponse::ok(data)))
}
