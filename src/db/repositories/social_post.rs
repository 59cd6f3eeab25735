//! Social post repository
//!
//! Posts are keyed by `(source_id, external_id)`. Re-scraping a post refreshes
//! its content but never touches `news_id`.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ScrapedPost, SocialPost, UpsertedPost};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Social post repository trait
#[async_trait]
pub trait SocialPostRepository: Send + Sync {
    /// Insert the post or refresh the stored copy with the same external id
    async fn upsert(&self, source_id: i64, post: &ScrapedPost) -> Result<UpsertedPost>;

    async fn get_by_id(&self, id: i64) -> Result<Option<SocialPost>>;

    /// List posts newest first, optionally restricted to one source
    async fn list(&self, source_id: Option<i64>, offset: i64, limit: i64) -> Result<Vec<SocialPost>>;

    async fn count(&self, source_id: Option<i64>) -> Result<i64>;

    /// Link the post to a news record. Returns `false` when the post was
    /// already linked.
    async fn mark_converted(&self, id: i64, news_id: i64) -> Result<bool>;
}

/// SQLx-based social post repository
pub struct SqlxSocialPostRepository {
    pool: DynDatabasePool,
}

impl SqlxSocialPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SocialPostRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_POST: &str = r#"
    SELECT id, source_id, external_id, url, title, content, author, images, posted_at,
           fetched_at, news_id, created_at
    FROM social_posts
"#;

#[async_trait]
impl SocialPostRepository for SqlxSocialPostRepository {
    async fn upsert(&self, source_id: i64, post: &ScrapedPost) -> Result<UpsertedPost> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => upsert_post_sqlite(self.pool.sqlite()?, source_id, post).await,
            DatabaseDriver::Mysql => upsert_post_mysql(self.pool.mysql()?, source_id, post).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<SocialPost>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_post_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_post_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list(&self, source_id: Option<i64>, offset: i64, limit: i64) -> Result<Vec<SocialPost>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_posts_sqlite(self.pool.sqlite()?, source_id, offset, limit).await,
            DatabaseDriver::Mysql => list_posts_mysql(self.pool.mysql()?, source_id, offset, limit).await,
        }
    }

    async fn count(&self, source_id: Option<i64>) -> Result<i64> {
        let sql = match source_id {
            Some(_) => "SELECT COUNT(*) as count FROM social_posts WHERE source_id = ?",
            None => "SELECT COUNT(*) as count FROM social_posts",
        };
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(sql);
                if let Some(id) = source_id {
                    query = query.bind(id);
                }
                let row = query
                    .fetch_one(self.pool.sqlite()?)
                    .await
                    .context("Failed to count social posts")?;
                Ok(row.get("count"))
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(sql);
                if let Some(id) = source_id {
                    query = query.bind(id);
                }
                let row = query
                    .fetch_one(self.pool.mysql()?)
                    .await
                    .context("Failed to count social posts")?;
                Ok(row.get("count"))
            }
        }
    }

    async fn mark_converted(&self, id: i64, news_id: i64) -> Result<bool> {
        let sql = "UPDATE social_posts SET news_id = ? WHERE id = ? AND news_id IS NULL";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(news_id)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to link social post to news")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(news_id)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to link social post to news")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

fn images_to_json(images: &[String]) -> Result<String> {
    serde_json::to_string(images).context("Failed to serialize post images")
}

fn images_from_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn upsert_post_sqlite(pool: &SqlitePool, source_id: i64, post: &ScrapedPost) -> Result<UpsertedPost> {
    let now = Utc::now();
    let images = images_to_json(&post.images)?;

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM social_posts WHERE source_id = ? AND external_id = ?",
    )
    .bind(source_id)
    .bind(&post.external_id)
    .fetch_optional(pool)
    .await
    .context("Failed to look up social post")?;

    let (id, created) = match existing {
        Some(id) => {
            sqlx::query(
                r#"
                UPDATE social_posts
                SET url = ?, title = ?, content = ?, author = ?, images = ?, posted_at = ?, fetched_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&post.url)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.author)
            .bind(&images)
            .bind(post.posted_at)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to refresh social post")?;
            (id, false)
        }
        None => {
            let result = sqlx::query(
                r#"
                INSERT INTO social_posts (source_id, external_id, url, title, content, author, images, posted_at, fetched_at, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(source_id)
            .bind(&post.external_id)
            .bind(&post.url)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.author)
            .bind(&images)
            .bind(post.posted_at)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to insert social post")?;
            (result.last_insert_rowid(), true)
        }
    };

    let post = get_post_by_id_sqlite(pool, id)
        .await?
        .context("Social post missing after upsert")?;
    Ok(UpsertedPost { post, created })
}

async fn get_post_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<SocialPost>> {
    let row = sqlx::query(&format!("{SELECT_POST} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get social post by ID")?;
    Ok(row.as_ref().map(row_to_post_sqlite))
}

async fn list_posts_sqlite(
    pool: &SqlitePool,
    source_id: Option<i64>,
    offset: i64,
    limit: i64,
) -> Result<Vec<SocialPost>> {
    let rows = match source_id {
        Some(source_id) => {
            sqlx::query(&format!(
                "{SELECT_POST} WHERE source_id = ? ORDER BY COALESCE(posted_at, fetched_at) DESC, id DESC LIMIT ? OFFSET ?"
            ))
            .bind(source_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(&format!(
                "{SELECT_POST} ORDER BY COALESCE(posted_at, fetched_at) DESC, id DESC LIMIT ? OFFSET ?"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
        }
    }
    .context("Failed to list social posts")?;

    Ok(rows.iter().map(row_to_post_sqlite).collect())
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> SocialPost {
    let images: String = row.get("images");
    SocialPost {
        id: row.get("id"),
        source_id: row.get("source_id"),
        external_id: row.get("external_id"),
        url: row.get("url"),
        title: row.get("title"),
        content: row.get("content"),
        author: row.get("author"),
        images: images_from_json(&images),
        posted_at: row.get("posted_at"),
        fetched_at: row.get("fetched_at"),
        news_id: row.get("news_id"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn upsert_post_mysql(pool: &MySqlPool, source_id: i64, post: &ScrapedPost) -> Result<UpsertedPost> {
    let now = Utc::now();
    let images = images_to_json(&post.images)?;

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM social_posts WHERE source_id = ? AND external_id = ?",
    )
    .bind(source_id)
    .bind(&post.external_id)
    .fetch_optional(pool)
    .await
    .context("Failed to look up social post")?;

    let (id, created) = match existing {
        Some(id) => {
            sqlx::query(
                r#"
                UPDATE social_posts
                SET url = ?, title = ?, content = ?, author = ?, images = ?, posted_at = ?, fetched_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&post.url)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.author)
            .bind(&images)
            .bind(post.posted_at)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to refresh social post")?;
            (id, false)
        }
        None => {
            let result = sqlx::query(
                r#"
                INSERT INTO social_posts (source_id, external_id, url, title, content, author, images, posted_at, fetched_at, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(source_id)
            .bind(&post.external_id)
            .bind(&post.url)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.author)
            .bind(&images)
            .bind(post.posted_at)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to insert social post")?;
            (result.last_insert_id() as i64, true)
        }
    };

    let post = get_post_by_id_mysql(pool, id)
        .await?
        .context("Social post missing after upsert")?;
    Ok(UpsertedPost { post, created })
}

async fn get_post_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<SocialPost>> {
    let row = sqlx::query(&format!("{SELECT_POST} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get social post by ID")?;
    Ok(row.as_ref().map(row_to_post_mysql))
}

async fn list_posts_mysql(
    pool: &MySqlPool,
    source_id: Option<i64>,
    offset: i64,
    limit: i64,
) -> Result<Vec<SocialPost>> {
    let rows = match source_id {
        Some(source_id) => {
            sqlx::query(&format!(
                "{SELECT_POST} WHERE source_id = ? ORDER BY COALESCE(posted_at, fetched_at) DESC, id DESC LIMIT ? OFFSET ?"
            ))
            .bind(source_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(&format!(
                "{SELECT_POST} ORDER BY COALESCE(posted_at, fetched_at) DESC, id DESC LIMIT ? OFFSET ?"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
        }
    }
    .context("Failed to list social posts")?;

    Ok(rows.iter().map(row_to_post_mysql).collect())
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> SocialPost {
    let images: String = row.get("images");
    SocialPost {
        id: row.get("id"),
        source_id: row.get("source_id"),
        external_id: row.get("external_id"),
        url: row.get("url"),
        title: row.get("title"),
        content: row.get("content"),
        author: row.get("author"),
        images: images_from_json(&images),
        posted_at: row.get("posted_at"),
        fetched_at: row.get("fetched_at"),
        news_id: row.get("news_id"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SocialSourceRepository, SqlxSocialSourceRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{ScrapeStrategy, SocialPlatform, SocialSource};
    use chrono::{Duration, TimeZone};

    async fn setup() -> (SqlxSocialPostRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let sources = SqlxSocialSourceRepository::new(pool.clone());
        let source = sources
            .upsert_by_key(&SocialSource::new(
                "weibo".into(),
                "Weibo".into(),
                SocialPlatform::Weibo,
                ScrapeStrategy::JsonFeed,
                "https://bridge.example.com/weibo.json".into(),
            ))
            .await
            .unwrap();

        (SqlxSocialPostRepository::new(pool), source.id)
    }

    fn scraped(id: &str, content: &str) -> ScrapedPost {
        let mut post = ScrapedPost::new(id, format!("https://weibo.com/status/{}", id), content);
        post.images = vec!["https://img.example.com/a.jpg".to_string()];
        post
    }

    #[tokio::test]
    async fn test_upsert_creates_then_refreshes() {
        let (repo, source_id) = setup().await;

        let first = repo.upsert(source_id, &scraped("1", "hello")).await.unwrap();
        assert!(first.created);
        assert_eq!(first.post.images.len(), 1);
        assert!(!first.post.is_converted());

        let second = repo.upsert(source_id, &scraped("1", "hello edited")).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.post.id, first.post.id);
        assert_eq!(second.post.content, "hello edited");
        assert_eq!(repo.count(Some(source_id)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_converted_only_once() {
        let (repo, source_id) = setup().await;
        let post = repo.upsert(source_id, &scraped("1", "hello")).await.unwrap().post;

        assert!(repo.mark_converted(post.id, 42).await.unwrap());
        assert!(!repo.mark_converted(post.id, 43).await.unwrap());

        let loaded = repo.get_by_id(post.id).await.unwrap().unwrap();
        assert_eq!(loaded.news_id, Some(42));

        // A refresh by the scraper keeps the link
        let refreshed = repo.upsert(source_id, &scraped("1", "hello again")).await.unwrap();
        assert_eq!(refreshed.post.news_id, Some(42));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let (repo, source_id) = setup().await;
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        for i in 0..3 {
            let mut post = scraped(&i.to_string(), "body");
            post.posted_at = Some(base + Duration::hours(i));
            repo.upsert(source_id, &post).await.unwrap();
        }

        let posts = repo.list(Some(source_id), 0, 10).await.unwrap();
        let ids: Vec<_> = posts.iter().map(|p| p.external_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1", "0"]);

        let page = repo.list(None, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].external_id, "1");
        assert_eq!(repo.count(None).await.unwrap(), 3);
        assert_eq!(repo.count(Some(source_id + 1)).await.unwrap(), 0);
    }
}
