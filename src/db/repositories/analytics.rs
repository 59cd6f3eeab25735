//! Analytics event repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::AnalyticsEvent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Analytics event repository trait
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Store an event. `event.id` is ignored and replaced by the row id.
    async fn insert(&self, event: &AnalyticsEvent) -> Result<AnalyticsEvent>;

    /// Number of stored events with the given name
    async fn count_by_name(&self, name: &str) -> Result<i64>;
}

/// SQLx-based analytics repository
pub struct SqlxAnalyticsRepository {
    pool: DynDatabasePool,
}

impl SqlxAnalyticsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AnalyticsRepository> {
        Arc::new(Self::new(pool))
    }
}

const INSERT_EVENT: &str = r#"
    INSERT INTO analytics_events (event_id, name, path, locale, referrer, properties, ip_hash, user_agent, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

#[async_trait]
impl AnalyticsRepository for SqlxAnalyticsRepository {
    async fn insert(&self, event: &AnalyticsEvent) -> Result<AnalyticsEvent> {
        let properties =
            serde_json::to_string(&event.properties).context("Failed to serialize properties")?;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => insert_event_sqlite(self.pool.sqlite()?, event, &properties).await?,
            DatabaseDriver::Mysql => insert_event_mysql(self.pool.mysql()?, event, &properties).await?,
        };
        Ok(AnalyticsEvent {
            id,
            ..event.clone()
        })
    }

    async fn count_by_name(&self, name: &str) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM analytics_events WHERE name = ?";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(name)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count analytics events")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(name)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count analytics events")?
                .get("count"),
        };
        Ok(count)
    }
}

async fn insert_event_sqlite(pool: &SqlitePool, event: &AnalyticsEvent, properties: &str) -> Result<i64> {
    let result = sqlx::query(INSERT_EVENT)
        .bind(&event.event_id)
        .bind(&event.name)
        .bind(&event.path)
        .bind(&event.locale)
        .bind(&event.referrer)
        .bind(properties)
        .bind(&event.ip_hash)
        .bind(&event.user_agent)
        .bind(event.created_at)
        .execute(pool)
        .await
        .context("Failed to insert analytics event")?;
    Ok(result.last_insert_rowid())
}

async fn insert_event_mysql(pool: &MySqlPool, event: &AnalyticsEvent, properties: &str) -> Result<i64> {
    let result = sqlx::query(INSERT_EVENT)
        .bind(&event.event_id)
        .bind(&event.name)
        .bind(&event.path)
        .bind(&event.locale)
        .bind(&event.referrer)
        .bind(properties)
        .bind(&event.ip_hash)
        .bind(&event.user_agent)
        .bind(event.created_at)
        .execute(pool)
        .await
        .context("Failed to insert analytics event")?;
    Ok(result.last_insert_id() as i64)
}
