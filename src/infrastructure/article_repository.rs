//! Repository for the deduplicated article store.
//!
//! Articles are unique per (source_id, source_article_id); gallery images
//! hang off the article row and die with it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::article::{parse_blocks, truncate_chars, Article, ScrapedArticle, ScrapedImage, EXCERPT_CHAR_LIMIT};
use crate::infrastructure::sources::SourceKey;

/// Read-mostly memo of source key -> internal source id.
///
/// Explicit and passed in, so its lifetime is the caller's choice (per run
/// or per process) and tests can inject a fresh one deterministically.
#[derive(Debug, Default)]
pub struct SourceIdCache {
    inner: Mutex<HashMap<SourceKey, String>>,
}

impl SourceIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a source key to its row id, memoizing the answer.
    pub async fn resolve(&self, pool: &SqlitePool, key: SourceKey) -> Result<String> {
        if let Some(id) = self.peek(key) {
            return Ok(id);
        }

        let row = sqlx::query("SELECT id FROM news_sources WHERE source_key = ?")
            .bind(key.as_str())
            .fetch_optional(pool)
            .await?;

        let id: String = row
            .map(|r| r.get("id"))
            .ok_or_else(|| anyhow!("News source '{}' not found in database", key.as_str()))?;

        if let Ok(mut map) = self.inner.lock() {
            map.insert(key, id.clone());
        }
        Ok(id)
    }

    fn peek(&self, key: SourceKey) -> Option<String> {
        self.inner.lock().ok().and_then(|map| map.get(&key).cloned())
    }

    /// Drop all memoized ids. Tests use this between fixture rebuilds.
    pub fn invalidate(&self) {
        if let Ok(mut map) = self.inner.lock() {
            map.clear();
        }
    }
}

#[derive(Clone)]
pub struct ArticleRepository {
    pool: Arc<SqlitePool>,
}

impl ArticleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Dedup lookup: the stored article id for (source, native id), if any.
    pub async fn find_by_dedup_key(
        &self,
        source_id: &str,
        source_article_id: &str,
    ) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT id FROM articles WHERE source_id = ? AND source_article_id = ?",
        )
        .bind(source_id)
        .bind(source_article_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|r| r.get("id")))
    }

    /// Persist a scraped article. The marker-encoded content string is
    /// converted back into a structured block list; the excerpt is derived
    /// from the first non-empty block.
    pub async fn insert_article(
        &self,
        source_id: &str,
        source_article_id: &str,
        source_url: &str,
        scraped: &ScrapedArticle,
    ) -> Result<String> {
        let blocks = parse_blocks(&scraped.content);
        let excerpt = blocks
            .iter()
            .map(|block| block.text().trim())
            .find(|text| !text.is_empty())
            .map(|text| truncate_chars(text, EXCERPT_CHAR_LIMIT));
        let content_json =
            serde_json::to_string(&blocks).context("Failed to serialize content blocks")?;
        let tags = if scraped.tags.is_empty() {
            None
        } else {
            Some(scraped.tags.join(","))
        };

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO articles
            (id, source_id, source_article_id, source_url, title, author, category, sub_category,
             tags, published_date, updated_date, content, excerpt, main_image_url,
             main_image_caption, scrape_status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'success', ?)
            "#,
        )
        .bind(&id)
        .bind(source_id)
        .bind(source_article_id)
        .bind(source_url)
        .bind(&scraped.title)
        .bind(&scraped.author)
        .bind(&scraped.category)
        .bind(&scraped.sub_category)
        .bind(&tags)
        .bind(&scraped.published_date)
        .bind(&scraped.updated_date)
        .bind(&content_json)
        .bind(&excerpt)
        .bind(&scraped.main_image_url)
        .bind(&scraped.main_image_caption)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await
        .context("Failed to create article")?;

        Ok(id)
    }

    /// Persist gallery images as child rows of the article.
    pub async fn insert_images(&self, article_id: &str, images: &[ScrapedImage]) -> Result<usize> {
        let mut inserted = 0;
        for (order, image) in images.iter().enumerate() {
            if image.url.is_empty() {
                continue;
            }
            sqlx::query(
                r#"
                INSERT INTO article_images (id, article_id, image_url, caption, display_order, is_main_image)
                VALUES (?, ?, ?, ?, ?, 0)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(article_id)
            .bind(&image.url)
            .bind(&image.caption)
            .bind(order as i64)
            .execute(&*self.pool)
            .await
            .context("Failed to create article images")?;
            inserted += 1;
        }
        Ok(inserted)
    }

    pub async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let row = sqlx::query(
            r#"
            SELECT id, source_id, source_article_id, source_url, title, author, category,
                   sub_category, tags, published_date, updated_date, content, excerpt,
                   main_image_url, main_image_caption, created_at
            FROM articles WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let content_json: String = row.get("content");
        Ok(Some(Article {
            id: row.get("id"),
            source_id: row.get("source_id"),
            source_article_id: row.get("source_article_id"),
            source_url: row.get("source_url"),
            title: row.get("title"),
            author: row.get("author"),
            category: row.get("category"),
            sub_category: row.get("sub_category"),
            tags: row.get("tags"),
            published_date: row.get("published_date"),
            updated_date: row.get("updated_date"),
            content: serde_json::from_str(&content_json).unwrap_or_default(),
            excerpt: row.get("excerpt"),
            main_image_url: row.get("main_image_url"),
            main_image_caption: row.get("main_image_caption"),
            created_at: row.get("created_at"),
        }))
    }

    pub async fn count_for_source(&self, source_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM articles WHERE source_id = ?")
            .bind(source_id)
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn count_images(&self, article_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM article_images WHERE article_id = ?")
            .bind(article_id)
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get("n"))
    }
}
