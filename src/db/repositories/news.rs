//! News repository
//!
//! Public reads go through `list_published` / `count_published`, which only
//! return rows with `status = 'published'` and a `published_at` not after the
//! given instant.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{NewNews, News, NewsStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// News repository trait
#[async_trait]
pub trait NewsRepository: Send + Sync {
    async fn create(&self, input: &NewNews) -> Result<News>;

    async fn get_by_id(&self, id: i64) -> Result<Option<News>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<News>>;

    /// News created from the given social post, if any
    async fn get_by_social_post(&self, social_post_id: i64) -> Result<Option<News>>;

    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;

    /// Published news visible at `now`, newest first
    async fn list_published(
        &self,
        now: DateTime<Utc>,
        locale: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<News>>;

    async fn count_published(&self, now: DateTime<Utc>, locale: Option<&str>) -> Result<i64>;
}

/// SQLx-based news repository
pub struct SqlxNewsRepository {
    pool: DynDatabasePool,
}

impl SqlxNewsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NewsRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_NEWS: &str = r#"
    SELECT id, slug, title, summary, content, content_html, cover_image, locale, category,
           status, published_at, source_url, social_post_id, created_at, updated_at
    FROM news
"#;

const PUBLISHED_FILTER: &str = "status = 'published' AND published_at IS NOT NULL AND published_at <= ?";

#[async_trait]
impl NewsRepository for SqlxNewsRepository {
    async fn create(&self, input: &NewNews) -> Result<News> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_news_sqlite(self.pool.sqlite()?, input).await,
            DatabaseDriver::Mysql => create_news_mysql(self.pool.mysql()?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<News>> {
        let sql = format!("{SELECT_NEWS} WHERE id = ?");
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get news by ID")?;
                row.as_ref().map(row_to_news_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get news by ID")?;
                row.as_ref().map(row_to_news_mysql).transpose()
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<News>> {
        let sql = format!("{SELECT_NEWS} WHERE slug = ?");
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get news by slug")?;
                row.as_ref().map(row_to_news_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get news by slug")?;
                row.as_ref().map(row_to_news_mysql).transpose()
            }
        }
    }

    async fn get_by_social_post(&self, social_post_id: i64) -> Result<Option<News>> {
        let sql = format!("{SELECT_NEWS} WHERE social_post_id = ?");
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(social_post_id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get news by social post")?;
                row.as_ref().map(row_to_news_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(social_post_id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get news by social post")?;
                row.as_ref().map(row_to_news_mysql).transpose()
            }
        }
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        let sql = "SELECT COUNT(*) as count FROM news WHERE slug = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(slug)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check news slug")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(slug)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check news slug")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn list_published(
        &self,
        now: DateTime<Utc>,
        locale: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<News>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_published_sqlite(self.pool.sqlite()?, now, locale, offset, limit).await
            }
            DatabaseDriver::Mysql => {
                list_published_mysql(self.pool.mysql()?, now, locale, offset, limit).await
            }
        }
    }

    async fn count_published(&self, now: DateTime<Utc>, locale: Option<&str>) -> Result<i64> {
        let sql = match locale {
            Some(_) => format!("SELECT COUNT(*) as count FROM news WHERE {PUBLISHED_FILTER} AND locale = ?"),
            None => format!("SELECT COUNT(*) as count FROM news WHERE {PUBLISHED_FILTER}"),
        };
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql).bind(now);
                if let Some(locale) = locale {
                    query = query.bind(locale);
                }
                query
                    .fetch_one(self.pool.sqlite()?)
                    .await
                    .context("Failed to count published news")?
                    .get("count")
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql).bind(now);
                if let Some(locale) = locale {
                    query = query.bind(locale);
                }
                query
                    .fetch_one(self.pool.mysql()?)
                    .await
                    .context("Failed to count published news")?
                    .get("count")
            }
        };
        Ok(count)
    }
}

fn published_list_sql(locale: Option<&str>) -> String {
    match locale {
        Some(_) => format!(
            "{SELECT_NEWS} WHERE {PUBLISHED_FILTER} AND locale = ? ORDER BY published_at DESC, id DESC LIMIT ? OFFSET ?"
        ),
        None => format!(
            "{SELECT_NEWS} WHERE {PUBLISHED_FILTER} ORDER BY published_at DESC, id DESC LIMIT ? OFFSET ?"
        ),
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_news_sqlite(pool: &SqlitePool, input: &NewNews) -> Result<News> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO news (slug, title, summary, content, content_html, cover_image, locale, category,
                          status, published_at, source_url, social_post_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.slug)
    .bind(&input.title)
    .bind(&input.summary)
    .bind(&input.content)
    .bind(&input.content_html)
    .bind(&input.cover_image)
    .bind(&input.locale)
    .bind(&input.category)
    .bind(input.status.as_str())
    .bind(input.published_at)
    .bind(&input.source_url)
    .bind(input.social_post_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create news")?;

    Ok(news_from_input(result.last_insert_rowid(), input, now))
}

async fn list_published_sqlite(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    locale: Option<&str>,
    offset: i64,
    limit: i64,
) -> Result<Vec<News>> {
    let sql = published_list_sql(locale);
    let mut query = sqlx::query(&sql).bind(now);
    if let Some(locale) = locale {
        query = query.bind(locale);
    }
    let rows = query
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list published news")?;
    rows.iter().map(row_to_news_sqlite).collect()
}

fn row_to_news_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<News> {
    let status_str: String = row.get("status");
    let status = NewsStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid news status: {}", status_str))?;

    Ok(News {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        summary: row.get("summary"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        cover_image: row.get("cover_image"),
        locale: row.get("locale"),
        category: row.get("category"),
        status,
        published_at: row.get("published_at"),
        source_url: row.get("source_url"),
        social_post_id: row.get("social_post_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_news_mysql(pool: &MySqlPool, input: &NewNews) -> Result<News> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO news (slug, title, summary, content, content_html, cover_image, locale, category,
                          status, published_at, source_url, social_post_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.slug)
    .bind(&input.title)
    .bind(&input.summary)
    .bind(&input.content)
    .bind(&input.content_html)
    .bind(&input.cover_image)
    .bind(&input.locale)
    .bind(&input.category)
    .bind(input.status.as_str())
    .bind(input.published_at)
    .bind(&input.source_url)
    .bind(input.social_post_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create news")?;

    Ok(news_from_input(result.last_insert_id() as i64, input, now))
}

async fn list_published_mysql(
    pool: &MySqlPool,
    now: DateTime<Utc>,
    locale: Option<&str>,
    offset: i64,
    limit: i64,
) -> Result<Vec<News>> {
    let sql = published_list_sql(locale);
    let mut query = sqlx::query(&sql).bind(now);
    if let Some(locale) = locale {
        query = query.bind(locale);
    }
    let rows = query
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list published news")?;
    rows.iter().map(row_to_news_mysql).collect()
}

fn row_to_news_mysql(row: &sqlx::mysql::MySqlRow) -> Result<News> {
    let status_str: String = row.get("status");
    let status = NewsStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid news status: {}", status_str))?;

    Ok(News {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        summary: row.get("summary"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        cover_image: row.get("cover_image"),
        locale: row.get("locale"),
        category: row.get("category"),
        status,
        published_at: row.get("published_at"),
        source_url: row.get("source_url"),
        social_post_id: row.get("social_post_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn news_from_input(id: i64, input: &NewNews, now: DateTime<Utc>) -> News {
    News {
        id,
        slug: input.slug.clone(),
        title: input.title.clone(),
        summary: input.summary.clone(),
        content: input.content.clone(),
        content_html: input.content_html.clone(),
        cover_image: input.cover_image.clone(),
        locale: input.locale.clone(),
        category: input.category.clone(),
        status: input.status,
        published_at: input.published_at,
        source_url: input.source_url.clone(),
        social_post_id: input.social_post_id,
        created_at: now,
        updated_at: now,
    }
}
