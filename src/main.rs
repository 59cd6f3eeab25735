//! Corpsite - corporate website backend

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use corpsite::{
    api::{self, middleware::RequestStats, token_digest, AppState},
    cache::create_cache,
    config::Config,
    db::{
        self,
        repositories::{
            SocialSourceRepository, SqlxAnalyticsRepository, SqlxNewsRepository, SqlxSocialPostRepository,
            SqlxSocialSourceRepository,
        },
    },
    services::{AnalyticsService, IpRateLimiter, NewsService},
    social::{PostConverter, ScraperRegistry, SocialScheduler},
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "corpsite=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting corpsite backend...");

    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    let cache = create_cache(&config.cache);

    // Repositories
    let source_repo = SqlxSocialSourceRepository::boxed(pool.clone());
    let post_repo = SqlxSocialPostRepository::boxed(pool.clone());

    // Configured sources are upserted by key; sync state on existing rows is kept
    let seeds = config
        .social
        .sources
        .iter()
        .cloned()
        .map(|seed| seed.into_source(config.scheduler.default_interval_minutes));
    let seeded = futures::future::try_join_all(seeds.map(|source| {
        let repo = source_repo.clone();
        async move { repo.upsert_by_key(&source).await }
    }))
    .await?;
    tracing::info!("Social sources seeded: {}", seeded.len());

    // Services
    let news_service = Arc::new(NewsService::new(SqlxNewsRepository::boxed(pool.clone()), cache));
    let rate_limiter = Arc::new(IpRateLimiter::per_minute(config.analytics.max_events_per_minute));
    let analytics_service = Arc::new(AnalyticsService::new(
        SqlxAnalyticsRepository::boxed(pool.clone()),
        rate_limiter.clone(),
        config.analytics.enabled,
    ));
    let converter = Arc::new(PostConverter::new(
        post_repo.clone(),
        source_repo.clone(),
        news_service.clone(),
    ));

    let scrapers = ScraperRegistry::with_defaults(&config.scheduler)?;
    let scheduler = SocialScheduler::new(source_repo.clone(), post_repo.clone(), converter.clone(), scrapers);
    if config.scheduler.autostart {
        let jobs = scheduler.start().await?;
        tracing::info!("Social scheduler running with {} jobs", jobs);
    }

    if config.admin.token.is_none() {
        tracing::warn!("No admin token configured, admin API is disabled");
    }

    let state = AppState {
        pool: pool.clone(),
        news_service,
        analytics_service,
        scheduler: scheduler.clone(),
        converter,
        source_repo,
        post_repo,
        admin_token_digest: config.admin.token.as_deref().map(token_digest),
        trust_proxy_headers: config.server.trust_proxy_headers,
        request_stats: Arc::new(RequestStats::new()),
    };

    // Prune the analytics rate limiter every 5 minutes
    {
        let limiter = rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                limiter.cleanup().await;
            }
        });
    }

    let app = api::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(scheduler.clone()))
        .await?;

    // Let sync runs that were already underway record their outcome
    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler.wait_idle()).await.is_err() {
        tracing::warn!("Social sync still running after {:?}, closing anyway", SHUTDOWN_GRACE);
    }

    pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C after stopping the scheduler
async fn shutdown_signal(scheduler: SocialScheduler) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
    scheduler.stop().await;
}
