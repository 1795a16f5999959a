use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::models::{ArticleRow, NewArticle};

/// All article columns in SELECT order (must match ArticleRow field order).
const ARTICLE_COLUMNS: &str = "id, title, slug, content_html, status, author_id, category, keywords, tags,
    image_url, background_image_url, content_alignment, paragraph_spacing, in_content_image_alignment,
    comments_enabled, created_at, published_at";

/// Create-only persistence for pipeline output.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Store a new article and return its identifier.
    async fn save_article(&self, article: &NewArticle) -> Result<String>;
}

pub struct SqliteArticleStore {
    pool: SqlitePool,
}

impl SqliteArticleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArticleStore for SqliteArticleStore {
    async fn save_article(&self, article: &NewArticle) -> Result<String> {
        insert_article(&self.pool, article).await
    }
}

pub async fn insert_article(pool: &SqlitePool, article: &NewArticle) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let keywords = serde_json::to_string(&article.keywords).context("serializing keywords")?;
    let tags = serde_json::to_string(&article.tags).context("serializing tags")?;

    sqlx::query(
        "INSERT INTO articles (id, title, slug, content_html, status, author_id, category, keywords, tags,
         image_url, background_image_url, content_alignment, paragraph_spacing, in_content_image_alignment,
         comments_enabled, created_at, published_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&article.title)
    .bind(&article.slug)
    .bind(&article.content_html)
    .bind(article.status.as_str())
    .bind(&article.author_id)
    .bind(&article.category)
    .bind(&keywords)
    .bind(&tags)
    .bind(&article.image_url)
    .bind(&article.background_image_url)
    .bind(article.content_alignment.as_str())
    .bind(&article.paragraph_spacing)
    .bind(article.in_content_image_alignment.as_str())
    .bind(article.comments_enabled)
    .bind(article.created_at)
    .bind(article.published_at)
    .execute(pool)
    .await
    .context("inserting article")?;

    debug!(id = %id, title = %article.title, "stored article");
    Ok(id)
}

pub async fn get_article(pool: &SqlitePool, id: &str) -> Result<Option<ArticleRow>> {
    let article = sqlx::query_as::<_, ArticleRow>(&format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetching article")?;
    Ok(article)
}

/// Most recent articles first, optionally filtered by status.
pub async fn list_articles(pool: &SqlitePool, status: Option<&str>, limit: i64) -> Result<Vec<ArticleRow>> {
    let articles = match status {
        Some(status) => {
            sqlx::query_as::<_, ArticleRow>(&format!(
                "SELECT {ARTICLE_COLUMNS} FROM articles WHERE status = ? ORDER BY created_at DESC LIMIT ?"
            ))
            .bind(status)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, ArticleRow>(&format!(
                "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY created_at DESC LIMIT ?"
            ))
            .bind(limit)
            .fetch_all(pool)
            .await
        }
    }
    .context("listing articles")?;
    Ok(articles)
}

pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("reading setting")?;
    Ok(row.map(|(v,)| v))
}

pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value,
         updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .context("writing setting")?;
    Ok(())
}
