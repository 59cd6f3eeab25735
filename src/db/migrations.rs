//! Database migrations
//!
//! Migrations are embedded in the binary as SQL strings, one variant per
//! driver. Applied versions are tracked in the `_migrations` table.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_social_sources",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS social_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_key VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                platform VARCHAR(20) NOT NULL,
                strategy VARCHAR(20) NOT NULL DEFAULT 'json_feed',
                url TEXT NOT NULL,
                locale VARCHAR(10) NOT NULL DEFAULT 'zh',
                interval_minutes INTEGER NOT NULL DEFAULT 60,
                enabled BOOLEAN NOT NULL DEFAULT 1,
                auto_convert BOOLEAN NOT NULL DEFAULT 1,
                auto_publish BOOLEAN NOT NULL DEFAULT 0,
                selectors TEXT,
                last_synced_at TIMESTAMP,
                last_status VARCHAR(20) NOT NULL DEFAULT 'never',
                last_error TEXT,
                last_found INTEGER NOT NULL DEFAULT 0,
                last_created INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_social_sources_enabled ON social_sources(enabled);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS social_sources (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                source_key VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                platform VARCHAR(20) NOT NULL,
                strategy VARCHAR(20) NOT NULL DEFAULT 'json_feed',
                url TEXT NOT NULL,
                locale VARCHAR(10) NOT NULL DEFAULT 'zh',
                interval_minutes BIGINT NOT NULL DEFAULT 60,
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                auto_convert BOOLEAN NOT NULL DEFAULT TRUE,
                auto_publish BOOLEAN NOT NULL DEFAULT FALSE,
                selectors TEXT,
                last_synced_at DATETIME NULL,
                last_status VARCHAR(20) NOT NULL DEFAULT 'never',
                last_error TEXT,
                last_found BIGINT NOT NULL DEFAULT 0,
                last_created BIGINT NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_social_sources_enabled ON social_sources(enabled);
        "#,
    },
    Migration {
        version: 2,
        name: "create_social_posts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS social_posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                external_id VARCHAR(255) NOT NULL,
                url TEXT NOT NULL,
                title TEXT,
                content TEXT NOT NULL,
                author VARCHAR(255),
                images TEXT NOT NULL DEFAULT '[]',
                posted_at TIMESTAMP,
                fetched_at TIMESTAMP NOT NULL,
                news_id INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (source_id, external_id),
                FOREIGN KEY (source_id) REFERENCES social_sources(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_social_posts_source_id ON social_posts(source_id);
            CREATE INDEX IF NOT EXISTS idx_social_posts_news_id ON social_posts(news_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS social_posts (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                source_id BIGINT NOT NULL,
                external_id VARCHAR(255) NOT NULL,
                url TEXT NOT NULL,
                title TEXT,
                content MEDIUMTEXT NOT NULL,
                author VARCHAR(255),
                images TEXT NOT NULL,
                posted_at DATETIME NULL,
                fetched_at DATETIME NOT NULL,
                news_id BIGINT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE KEY uniq_social_posts_source_external (source_id, external_id),
                FOREIGN KEY (source_id) REFERENCES social_sources(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_social_posts_news_id ON social_posts(news_id);
        "#,
    },
    Migration {
        version: 3,
        name: "create_news",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS news (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(255) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                cover_image TEXT,
                locale VARCHAR(10) NOT NULL DEFAULT 'zh',
                category VARCHAR(50) NOT NULL DEFAULT 'news',
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                published_at TIMESTAMP,
                source_url TEXT,
                social_post_id INTEGER UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (social_post_id) REFERENCES social_posts(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_news_status_published ON news(status, published_at);
            CREATE INDEX IF NOT EXISTS idx_news_locale ON news(locale);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS news (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(255) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                summary TEXT NOT NULL,
                content MEDIUMTEXT NOT NULL,
                content_html MEDIUMTEXT NOT NULL,
                cover_image TEXT,
                locale VARCHAR(10) NOT NULL DEFAULT 'zh',
                category VARCHAR(50) NOT NULL DEFAULT 'news',
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                published_at DATETIME NULL,
                source_url TEXT,
                social_post_id BIGINT NULL UNIQUE,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (social_post_id) REFERENCES social_posts(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_news_status_published ON news(status, published_at);
            CREATE INDEX idx_news_locale ON news(locale);
        "#,
    },
    Migration {
        version: 4,
        name: "create_analytics_events",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS analytics_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id VARCHAR(36) NOT NULL UNIQUE,
                name VARCHAR(64) NOT NULL,
                path VARCHAR(512) NOT NULL,
                locale VARCHAR(10),
                referrer TEXT,
                properties TEXT NOT NULL DEFAULT '{}',
                ip_hash VARCHAR(64),
                user_agent TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_analytics_events_name ON analytics_events(name);
            CREATE INDEX IF NOT EXISTS idx_analytics_events_created_at ON analytics_events(created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS analytics_events (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                event_id VARCHAR(36) NOT NULL UNIQUE,
                name VARCHAR(64) NOT NULL,
                path VARCHAR(512) NOT NULL,
                locale VARCHAR(10),
                referrer TEXT,
                properties TEXT NOT NULL,
                ip_hash VARCHAR(64),
                user_agent TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_analytics_events_name ON analytics_events(name);
            CREATE INDEX idx_analytics_events_created_at ON analytics_events(created_at);
        "#,
    },
];

/// Run all pending migrations and return how many were applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = applied_versions(pool).await?;
    let mut count = 0;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        tracing::info!(version = migration.version, name = migration.name, "Applying migration");
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn applied_versions(pool: &DynDatabasePool) -> Result<Vec<i32>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => applied_versions_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => applied_versions_mysql(pool.mysql()?).await,
    }
}

async fn applied_versions_sqlite(pool: &SqlitePool) -> Result<Vec<i32>> {
    let rows = sqlx::query("SELECT version FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;
    Ok(rows.iter().map(|row| row.get::<i64, _>("version") as i32).collect())
}

async fn applied_versions_mysql(pool: &MySqlPool) -> Result<Vec<i32>> {
    let rows = sqlx::query("SELECT version FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;
    Ok(rows.iter().map(|row| row.get::<i32, _>("version")).collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => {
            let pool = pool.sqlite()?;
            for statement in split_sql_statements(migration.up_sqlite) {
                sqlx::query(statement)
                    .execute(pool)
                    .await
                    .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
            }
            sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
                .bind(migration.version)
                .bind(migration.name)
                .execute(pool)
                .await?;
        }
        DatabaseDriver::Mysql => {
            let pool = pool.mysql()?;
            for statement in split_sql_statements(migration.up_mysql) {
                sqlx::query(statement)
                    .execute(pool)
                    .await
                    .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
            }
            sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
                .bind(migration.version)
                .bind(migration.name)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Number of migrations not applied yet
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = applied_versions(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .count())
}
