//! API layer - HTTP handlers and routing
//!
//! Public endpoints:
//! - Health check
//! - Published news list and detail
//! - Analytics event ingestion
//!
//! Admin endpoints (admin token required):
//! - Social scheduler control, sources and posts

pub mod analytics;
pub mod health;
pub mod middleware;
pub mod news;
pub mod social;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use middleware::{token_digest, ApiError, ApiResponse, AppState, RequestStats};

/// Build the API router, nested under `/api`
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let admin_routes = Router::new()
        .nest("/admin/social", social::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_admin_token,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/news", get(news::list_news))
        .route("/news/{slug}", get(news::get_news))
        .route("/analytics/events", post(analytics::record_event))
        .merge(admin_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => tracing::warn!("Invalid CORS origin '{}', cross-origin requests will be refused", cors_origin),
    }

    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        // Outermost so every request is counted
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::{
        SqlxAnalyticsRepository, SqlxNewsRepository, SqlxSocialPostRepository, SqlxSocialSourceRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{ScrapeStrategy, ScrapedPost, SocialSource};
    use crate::services::{AnalyticsService, IpRateLimiter, NewsService};
    use crate::social::{PostConverter, ScrapeError, Scraper, ScraperRegistry, SocialScheduler};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    pub const ADMIN_TOKEN: &str = "test-admin-token";

    /// Serves fixed posts after a short delay
    pub struct FixedScraper {
        pub posts: Vec<ScrapedPost>,
        pub delay: Duration,
    }

    #[async_trait]
    impl Scraper for FixedScraper {
        fn strategy(&self) -> ScrapeStrategy {
            ScrapeStrategy::JsonFeed
        }

        async fn scrape(&self, _source: &SocialSource) -> Result<Vec<ScrapedPost>, ScrapeError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.posts.clone())
        }
    }

    pub async fn test_state(scraper: FixedScraper, admin_token: Option<&str>) -> AppState {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let source_repo = SqlxSocialSourceRepository::boxed(pool.clone());
        let post_repo = SqlxSocialPostRepository::boxed(pool.clone());
        let news_service = Arc::new(NewsService::new(
            SqlxNewsRepository::boxed(pool.clone()),
            create_cache(&CacheConfig::default()),
        ));
        let analytics_service = Arc::new(AnalyticsService::new(
            SqlxAnalyticsRepository::boxed(pool.clone()),
            Arc::new(IpRateLimiter::per_minute(2)),
            true,
        ));
        let converter = Arc::new(PostConverter::new(
            post_repo.clone(),
            source_repo.clone(),
            news_service.clone(),
        ));

        let mut registry = ScraperRegistry::new();
        registry.register(Arc::new(scraper));
        let scheduler = SocialScheduler::new(source_repo.clone(), post_repo.clone(), converter.clone(), registry);

        AppState {
            pool,
            news_service,
            analytics_service,
            scheduler,
            converter,
            source_repo,
            post_repo,
            admin_token_digest: admin_token.map(token_digest),
            // Requests in tests carry their address in X-Forwarded-For
            trust_proxy_headers: true,
            request_stats: Arc::new(RequestStats::new()),
        }
    }
}
