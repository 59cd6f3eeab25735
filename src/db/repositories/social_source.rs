//! Social source repository
//!
//! Sources are created from configuration seeds (upsert by key) and carry the
//! sync state written by the scheduler after every run.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{HtmlSelectors, SocialSource, SyncState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Social source repository trait
#[async_trait]
pub trait SocialSourceRepository: Send + Sync {
    /// Insert a source or update the configuration fields of the source with
    /// the same key. Sync state of an existing row is preserved.
    async fn upsert_by_key(&self, source: &SocialSource) -> Result<SocialSource>;

    async fn get_by_id(&self, id: i64) -> Result<Option<SocialSource>>;

    async fn get_by_key(&self, key: &str) -> Result<Option<SocialSource>>;

    /// All sources ordered by id
    async fn list(&self) -> Result<Vec<SocialSource>>;

    /// Enabled sources ordered by id
    async fn list_enabled(&self) -> Result<Vec<SocialSource>>;

    /// Record the outcome of a sync run
    async fn update_sync_state(&self, id: i64, state: &SyncState) -> Result<()>;
}

/// SQLx-based social source repository
pub struct SqlxSocialSourceRepository {
    pool: DynDatabasePool,
}

impl SqlxSocialSourceRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SocialSourceRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_SOURCE: &str = r#"
    SELECT id, source_key, name, platform, strategy, url, locale, interval_minutes,
           enabled, auto_convert, auto_publish, selectors, last_synced_at, last_status,
           last_error, last_found, last_created, created_at, updated_at
    FROM social_sources
"#;

#[async_trait]
impl SocialSourceRepository for SqlxSocialSourceRepository {
    async fn upsert_by_key(&self, source: &SocialSource) -> Result<SocialSource> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => upsert_source_sqlite(self.pool.sqlite()?, source).await,
            DatabaseDriver::Mysql => upsert_source_mysql(self.pool.mysql()?, source).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<SocialSource>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_source_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_source_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<SocialSource>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_source_by_key_sqlite(self.pool.sqlite()?, key).await,
            DatabaseDriver::Mysql => get_source_by_key_mysql(self.pool.mysql()?, key).await,
        }
    }

    async fn list(&self) -> Result<Vec<SocialSource>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_sources_sqlite(self.pool.sqlite()?, false).await,
            DatabaseDriver::Mysql => list_sources_mysql(self.pool.mysql()?, false).await,
        }
    }

    async fn list_enabled(&self) -> Result<Vec<SocialSource>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_sources_sqlite(self.pool.sqlite()?, true).await,
            DatabaseDriver::Mysql => list_sources_mysql(self.pool.mysql()?, true).await,
        }
    }

    async fn update_sync_state(&self, id: i64, state: &SyncState) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_sync_state_sqlite(self.pool.sqlite()?, id, state).await,
            DatabaseDriver::Mysql => update_sync_state_mysql(self.pool.mysql()?, id, state).await,
        }
    }
}

fn selectors_to_json(selectors: &Option<HtmlSelectors>) -> Result<Option<String>> {
    selectors
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to serialize selectors")
}

fn selectors_from_json(raw: Option<String>) -> Result<Option<HtmlSelectors>> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => {
            Ok(Some(serde_json::from_str(&raw).context("Invalid selectors JSON")?))
        }
        _ => Ok(None),
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn upsert_source_sqlite(pool: &SqlitePool, source: &SocialSource) -> Result<SocialSource> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO social_sources (source_key, name, platform, strategy, url, locale, interval_minutes,
                                    enabled, auto_convert, auto_publish, selectors, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_key) DO UPDATE SET
            name = excluded.name,
            platform = excluded.platform,
            strategy = excluded.strategy,
            url = excluded.url,
            locale = excluded.locale,
            interval_minutes = excluded.interval_minutes,
            enabled = excluded.enabled,
            auto_convert = excluded.auto_convert,
            auto_publish = excluded.auto_publish,
            selectors = excluded.selectors,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&source.key)
    .bind(&source.name)
    .bind(source.platform.as_str())
    .bind(source.strategy.as_str())
    .bind(&source.url)
    .bind(&source.locale)
    .bind(source.interval_minutes)
    .bind(source.enabled)
    .bind(source.auto_convert)
    .bind(source.auto_publish)
    .bind(selectors_to_json(&source.selectors)?)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to upsert social source '{}'", source.key))?;

    get_source_by_key_sqlite(pool, &source.key)
        .await?
        .with_context(|| format!("Social source '{}' missing after upsert", source.key))
}

async fn get_source_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<SocialSource>> {
    let row = sqlx::query(&format!("{SELECT_SOURCE} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get social source by ID")?;
    row.as_ref().map(row_to_source_sqlite).transpose()
}

async fn get_source_by_key_sqlite(pool: &SqlitePool, key: &str) -> Result<Option<SocialSource>> {
    let row = sqlx::query(&format!("{SELECT_SOURCE} WHERE source_key = ?"))
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get social source by key")?;
    row.as_ref().map(row_to_source_sqlite).transpose()
}

async fn list_sources_sqlite(pool: &SqlitePool, enabled_only: bool) -> Result<Vec<SocialSource>> {
    let sql = if enabled_only {
        format!("{SELECT_SOURCE} WHERE enabled = 1 ORDER BY id")
    } else {
        format!("{SELECT_SOURCE} ORDER BY id")
    };
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list social sources")?;
    rows.iter().map(row_to_source_sqlite).collect()
}

async fn update_sync_state_sqlite(pool: &SqlitePool, id: i64, state: &SyncState) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE social_sources
        SET last_synced_at = ?, last_status = ?, last_error = ?, last_found = ?, last_created = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(state.synced_at)
    .bind(state.status.as_str())
    .bind(&state.error)
    .bind(state.found)
    .bind(state.created)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update social source sync state")?;
    Ok(())
}

fn row_to_source_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<SocialSource> {
    let platform: String = row.get("platform");
    let strategy: String = row.get("strategy");
    let status: String = row.get("last_status");

    Ok(SocialSource {
        id: row.get("id"),
        key: row.get("source_key"),
        name: row.get("name"),
        platform: platform.parse()?,
        strategy: strategy.parse()?,
        url: row.get("url"),
        locale: row.get("locale"),
        interval_minutes: row.get("interval_minutes"),
        enabled: row.get("enabled"),
        auto_convert: row.get("auto_convert"),
        auto_publish: row.get("auto_publish"),
        selectors: selectors_from_json(row.get("selectors"))?,
        last_synced_at: row.get("last_synced_at"),
        last_status: status.parse()?,
        last_error: row.get("last_error"),
        last_found: row.get("last_found"),
        last_created: row.get("last_created"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn upsert_source_mysql(pool: &MySqlPool, source: &SocialSource) -> Result<SocialSource> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO social_sources (source_key, name, platform, strategy, url, locale, interval_minutes,
                                    enabled, auto_convert, auto_publish, selectors, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            name = VALUES(name),
            platform = VALUES(platform),
            strategy = VALUES(strategy),
            url = VALUES(url),
            locale = VALUES(locale),
            interval_minutes = VALUES(interval_minutes),
            enabled = VALUES(enabled),
            auto_convert = VALUES(auto_convert),
            auto_publish = VALUES(auto_publish),
            selectors = VALUES(selectors),
            updated_at = VALUES(updated_at)
        "#,
    )
    .bind(&source.key)
    .bind(&source.name)
    .bind(source.platform.as_str())
    .bind(source.strategy.as_str())
    .bind(&source.url)
    .bind(&source.locale)
    .bind(source.interval_minutes)
    .bind(source.enabled)
    .bind(source.auto_convert)
    .bind(source.auto_publish)
    .bind(selectors_to_json(&source.selectors)?)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to upsert social source '{}'", source.key))?;

    get_source_by_key_mysql(pool, &source.key)
        .await?
        .with_context(|| format!("Social source '{}' missing after upsert", source.key))
}

async fn get_source_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<SocialSource>> {
    let row = sqlx::query(&format!("{SELECT_SOURCE} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get social source by ID")?;
    row.as_ref().map(row_to_source_mysql).transpose()
}

async fn get_source_by_key_mysql(pool: &MySqlPool, key: &str) -> Result<Option<SocialSource>> {
    let row = sqlx::query(&format!("{SELECT_SOURCE} WHERE source_key = ?"))
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get social source by key")?;
    row.as_ref().map(row_to_source_mysql).transpose()
}

async fn list_sources_mysql(pool: &MySqlPool, enabled_only: bool) -> Result<Vec<SocialSource>> {
    let sql = if enabled_only {
        format!("{SELECT_SOURCE} WHERE enabled = TRUE ORDER BY id")
    } else {
        format!("{SELECT_SOURCE} ORDER BY id")
    };
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list social sources")?;
    rows.iter().map(row_to_source_mysql).collect()
}

async fn update_sync_state_mysql(pool: &MySqlPool, id: i64, state: &SyncState) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE social_sources
        SET last_synced_at = ?, last_status = ?, last_error = ?, last_found = ?, last_created = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(state.synced_at)
    .bind(state.status.as_str())
    .bind(&state.error)
    .bind(state.found)
    .bind(state.created)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update social source sync state")?;
    Ok(())
}

fn row_to_source_mysql(row: &sqlx::mysql::MySqlRow) -> Result<SocialSource> {
    let platform: String = row.get("platform");
    let strategy: String = row.get("strategy");
    let status: String = row.get("last_status");

    Ok(SocialSource {
        id: row.get("id"),
        key: row.get("source_key"),
        name: row.get("name"),
        platform: platform.parse()?,
        strategy: strategy.parse()?,
        url: row.get("url"),
        locale: row.get("locale"),
        interval_minutes: row.get("interval_minutes"),
        enabled: row.get("enabled"),
        auto_convert: row.get("auto_convert"),
        auto_publish: row.get("auto_publish"),
        selectors: selectors_from_json(row.get("selectors"))?,
        last_synced_at: row.get("last_synced_at"),
        last_status: status.parse()?,
        last_error: row.get("last_error"),
        last_found: row.get("last_found"),
        last_created: row.get("last_created"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{ScrapeStrategy, SocialPlatform, SyncStatus};

    async fn setup_test_repo() -> SqlxSocialSourceRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxSocialSourceRepository::new(pool)
    }

    fn sample_source(key: &str) -> SocialSource {
        SocialSource::new(
            key.to_string(),
            format!("Source {}", key),
            SocialPlatform::Weibo,
            ScrapeStrategy::JsonFeed,
            format!("https://bridge.example.com/{}.json", key),
        )
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let repo = setup_test_repo().await;

        let created = repo.upsert_by_key(&sample_source("weibo")).await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.platform, SocialPlatform::Weibo);
        assert_eq!(created.last_status, SyncStatus::Never);

        let mut changed = sample_source("weibo");
        changed.name = "Renamed".to_string();
        changed.interval_minutes = 15;
        changed.enabled = false;
        let updated = repo.upsert_by_key(&changed).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.interval_minutes, 15);
        assert!(!updated.enabled);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_keeps_sync_state() {
        let repo = setup_test_repo().await;
        let created = repo.upsert_by_key(&sample_source("weibo")).await.unwrap();

        let state = SyncState {
            status: SyncStatus::Success,
            error: None,
            found: 5,
            created: 3,
            synced_at: Utc::now(),
        };
        repo.update_sync_state(created.id, &state).await.unwrap();

        let reseeded = repo.upsert_by_key(&sample_source("weibo")).await.unwrap();
        assert_eq!(reseeded.last_status, SyncStatus::Success);
        assert_eq!(reseeded.last_found, 5);
        assert_eq!(reseeded.last_created, 3);
        assert!(reseeded.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_selectors_roundtrip() {
        let repo = setup_test_repo().await;
        let mut source = sample_source("blog");
        source.strategy = ScrapeStrategy::Html;
        source.selectors = Some(HtmlSelectors {
            item: "article".to_string(),
            title: Some("h2".to_string()),
            link: Some("a".to_string()),
            ..Default::default()
        });

        let saved = repo.upsert_by_key(&source).await.unwrap();
        let loaded = repo.get_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(loaded.strategy, ScrapeStrategy::Html);
        assert_eq!(loaded.selectors, source.selectors);
    }

    #[tokio::test]
    async fn test_list_enabled() {
        let repo = setup_test_repo().await;
        repo.upsert_by_key(&sample_source("a")).await.unwrap();
        let mut disabled = sample_source("b");
        disabled.enabled = false;
        repo.upsert_by_key(&disabled).await.unwrap();

        let enabled = repo.list_enabled().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].key, "a");
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_sync_state() {
        let repo = setup_test_repo().await;
        let created = repo.upsert_by_key(&sample_source("a")).await.unwrap();

        let state = SyncState {
            status: SyncStatus::Failed,
            error: Some("HTTP 503".to_string()),
            found: 0,
            created: 0,
            synced_at: Utc::now(),
        };
        repo.update_sync_state(created.id, &state).await.unwrap();

        let loaded = repo.get_by_key("a").await.unwrap().unwrap();
        assert_eq!(loaded.last_status, SyncStatus::Failed);
        assert_eq!(loaded.last_error.as_deref(), Some("HTTP 503"));
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }
}
