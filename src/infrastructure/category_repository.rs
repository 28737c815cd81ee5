//! Repository for news sources and their scraper categories.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::domain::category::ScraperCategory;
use crate::infrastructure::sources::{NewsSource, SourceKey};

/// Source whose configuration is provisioned on demand so the pipeline is
/// never blocked by an empty setup.
pub const FALLBACK_SOURCE_KEY: SourceKey = SourceKey::Hk01;
const FALLBACK_CATEGORY_SLUG: &str = "hk01-auto";
const FALLBACK_CATEGORY_NAME: &str = "HK01 Default Scheduler";
const FALLBACK_CATEGORY_PRIORITY: i64 = 10;

#[derive(Clone)]
pub struct CategoryRepository {
    pool: Arc<SqlitePool>,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Create the source row if absent; returns its id either way.
    pub async fn ensure_source(&self, key: SourceKey) -> Result<String> {
        if let Some(id) = self.find_source_id(key).await? {
            return Ok(id);
        }

        let source = NewsSource::for_key(key);
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO news_sources (id, source_key, name, base_url, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(key.as_str())
        .bind(&source.name)
        .bind(&source.base_url)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;

        // Re-read in case a concurrent writer won the conflict
        self.find_source_id(key)
            .await?
            .ok_or_else(|| anyhow!("News source '{}' vanished after insert", key.as_str()))
    }

    pub async fn find_source_id(&self, key: SourceKey) -> Result<Option<String>> {
        let row = sqlx::query("SELECT id FROM news_sources WHERE source_key = ?")
            .bind(key.as_str())
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Upsert a category on (source_id, slug).
    pub async fn create_category(
        &self,
        source_id: &str,
        slug: &str,
        name: &str,
        priority: i64,
        listing_url: Option<&str>,
    ) -> Result<ScraperCategory> {
        let metadata = listing_url.map(|url| serde_json::json!({ "listing_url": url }).to_string());
        sqlx::query(
            r#"
            INSERT INTO scraper_categories (id, source_id, slug, name, priority, is_enabled, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT (source_id, slug) DO UPDATE SET
                name = excluded.name,
                priority = excluded.priority,
                metadata = COALESCE(excluded.metadata, scraper_categories.metadata)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(source_id)
        .bind(slug)
        .bind(name)
        .bind(priority)
        .bind(&metadata)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;

        self.by_slug(slug)
            .await?
            .ok_or_else(|| anyhow!("Category '{slug}' vanished after upsert"))
    }

    /// Enabled categories, stalest first: `last_run_at` ascending with
    /// never-run (NULL) rows leading, then priority ascending.
    pub async fn enabled_ordered(
        &self,
        source_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScraperCategory>> {
        let mut sql = format!("{SELECT_CATEGORY} WHERE c.is_enabled = 1");
        if source_id.is_some() {
            sql.push_str(" AND c.source_id = ?");
        }
        sql.push_str(" ORDER BY c.last_run_at ASC, c.priority ASC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(source_id) = source_id {
            query = query.bind(source_id);
        }
        let rows = query.bind(limit as i64).fetch_all(&*self.pool).await?;
        Ok(rows.iter().map(map_category).collect())
    }

    pub async fn by_slug(&self, slug: &str) -> Result<Option<ScraperCategory>> {
        let row = sqlx::query(&format!("{SELECT_CATEGORY} WHERE c.slug = ?"))
            .bind(slug)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.as_ref().map(map_category))
    }

    pub async fn update_last_run(&self, category_id: &str, timestamp: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE scraper_categories SET last_run_at = ? WHERE id = ?")
            .bind(timestamp)
            .bind(category_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    /// Lazily provision the fallback source and its default category so
    /// selection never dead-ends on missing configuration.
    pub async fn ensure_default_category(&self) -> Result<ScraperCategory> {
        if let Some(existing) = self.by_slug(FALLBACK_CATEGORY_SLUG).await? {
            return Ok(existing);
        }

        let source_id = self.ensure_source(FALLBACK_SOURCE_KEY).await?;
        info!(
            "Provisioning default scheduler category '{}' for {}",
            FALLBACK_CATEGORY_SLUG,
            FALLBACK_SOURCE_KEY.as_str()
        );
        self.create_category(
            &source_id,
            FALLBACK_CATEGORY_SLUG,
            FALLBACK_CATEGORY_NAME,
            FALLBACK_CATEGORY_PRIORITY,
            None,
        )
        .await
    }
}

const SELECT_CATEGORY: &str = r#"
    SELECT c.id, c.source_id, s.source_key, c.slug, c.name, c.priority,
           c.is_enabled, c.last_run_at, c.metadata
    FROM scraper_categories c
    JOIN news_sources s ON s.id = c.source_id
"#;

fn map_category(row: &sqlx::sqlite::SqliteRow) -> ScraperCategory {
    let metadata: Option<String> = row.get("metadata");
    ScraperCategory {
        id: row.get("id"),
        source_id: row.get("source_id"),
        source_key: row.get("source_key"),
        slug: row.get("slug"),
        name: row.get("name"),
        priority: row.get("priority"),
        is_enabled: row.get("is_enabled"),
        last_run_at: row.get("last_run_at"),
        metadata: metadata.and_then(|raw| serde_json::from_str(&raw).ok()),
    }
}
