//! Repository for the newslist work queue.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::newslist::{CandidateLink, NewslistEntry, NewslistStatus};
use crate::infrastructure::sources::SourceKey;

const UPSERT_CHUNK_SIZE: usize = 100;

/// Outcome of upserting a discovery run into the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub discovered: usize,
    pub saved: usize,
    pub duplicates: usize,
}

/// Operator-facing listing filter.
#[derive(Debug, Clone, Default)]
pub struct NewslistFilter {
    pub status: Option<NewslistStatus>,
    pub source_key: Option<SourceKey>,
    /// Matches the category label recorded in entry meta.
    pub category: Option<String>,
    /// Substring match on the native id or the URL.
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

#[derive(Clone)]
pub struct NewslistRepository {
    pool: Arc<SqlitePool>,
}

impl NewslistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Queue discovered candidates, ignoring ones already known for this
    /// source. Re-discovery of the same native id is a no-op, never a new
    /// row.
    pub async fn upsert_candidates(
        &self,
        source_id: &str,
        candidates: &[CandidateLink],
        provenance: Option<&serde_json::Value>,
    ) -> Result<UpsertReport> {
        let mut report = UpsertReport { discovered: candidates.len(), ..Default::default() };

        for chunk in candidates.chunks(UPSERT_CHUNK_SIZE) {
            for candidate in chunk {
                let mut meta = serde_json::json!({
                    "category": candidate.category,
                    "title": candidate.title,
                });
                if let (Some(object), Some(extra)) = (meta.as_object_mut(), provenance) {
                    if let Some(extra) = extra.as_object() {
                        for (key, value) in extra {
                            object.insert(key.clone(), value.clone());
                        }
                    }
                }

                let result = sqlx::query(
                    r#"
                    INSERT INTO newslist (id, source_id, source_article_id, url, status, meta, created_at, updated_at)
                    VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)
                    ON CONFLICT (source_id, source_article_id) DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(source_id)
                .bind(&candidate.article_id)
                .bind(&candidate.url)
                .bind(meta.to_string())
                .bind(Utc::now())
                .bind(Utc::now())
                .execute(&*self.pool)
                .await
                .context("Failed to upsert newslist entry")?;

                if result.rows_affected() > 0 {
                    report.saved += 1;
                } else {
                    report.duplicates += 1;
                }
            }
        }

        Ok(report)
    }

    pub async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<NewslistEntry>> {
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query(&format!("{SELECT_ENTRY} WHERE n.id = ?"))
                .bind(id)
                .fetch_optional(&*self.pool)
                .await?;
            if let Some(row) = row {
                entries.push(map_entry(&row)?);
            }
        }
        Ok(entries)
    }

    /// Pull work in discovery order, restricted to an explicit set of
    /// eligible statuses ({pending} normally, {pending, failed} when a
    /// caller forces re-processing).
    pub async fn fetch_eligible(
        &self,
        statuses: &[NewslistStatus],
        limit: usize,
    ) -> Result<Vec<NewslistEntry>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "{SELECT_ENTRY} WHERE n.status IN ({placeholders}) ORDER BY n.created_at ASC LIMIT ?"
        );
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.bind(limit as i64).fetch_all(&*self.pool).await?;
        rows.iter().map(map_entry).collect()
    }

    /// Claim an entry: mark it processing, bump the attempt counter and
    /// clear the previous failure reason.
    pub async fn mark_processing(&self, source_id: &str, source_article_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE newslist
            SET status = 'processing',
                attempt_count = attempt_count + 1,
                error_log = NULL,
                last_processed_at = ?,
                updated_at = ?
            WHERE source_id = ? AND source_article_id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(source_id)
        .bind(source_article_id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Terminal success. Idempotent: marking an already-extracted entry
    /// again is not an error. `resolved_article_id` is left untouched when
    /// `None` (the already-existing case).
    pub async fn mark_extracted(
        &self,
        source_id: &str,
        source_article_id: &str,
        resolved_article_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE newslist
            SET status = 'extracted',
                resolved_article_id = COALESCE(?, resolved_article_id),
                error_log = NULL,
                last_processed_at = ?,
                updated_at = ?
            WHERE source_id = ? AND source_article_id = ?
            "#,
        )
        .bind(resolved_article_id)
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(source_id)
        .bind(source_article_id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Terminal failure with the reason preserved verbatim for triage.
    /// `bump_attempt` is set when no `processing` claim preceded the
    /// failure (fetch/extraction errors), so attempts stay monotonic
    /// without double counting.
    pub async fn mark_failed(
        &self,
        source_id: &str,
        source_article_id: &str,
        error: &str,
        bump_attempt: bool,
    ) -> Result<()> {
        let bump = i64::from(bump_attempt);
        sqlx::query(
            r#"
            UPDATE newslist
            SET status = 'failed',
                error_log = ?,
                attempt_count = attempt_count + ?,
                last_processed_at = ?,
                updated_at = ?
            WHERE source_id = ? AND source_article_id = ?
            "#,
        )
        .bind(error)
        .bind(bump)
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(source_id)
        .bind(source_article_id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_entry(
        &self,
        source_id: &str,
        source_article_id: &str,
    ) -> Result<Option<NewslistEntry>> {
        let row = sqlx::query(&format!(
            "{SELECT_ENTRY} WHERE n.source_id = ? AND n.source_article_id = ?"
        ))
        .bind(source_id)
        .bind(source_article_id)
        .fetch_optional(&*self.pool)
        .await?;
        row.as_ref().map(map_entry).transpose()
    }

    /// Operator listing with pagination; returns the page and the total
    /// match count.
    pub async fn list(&self, filter: &NewslistFilter) -> Result<(Vec<NewslistEntry>, i64)> {
        let mut conditions = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("n.status = ?".to_string());
            binds.push(status.as_str().to_string());
        }
        if let Some(source_key) = filter.source_key {
            conditions.push("s.source_key = ?".to_string());
            binds.push(source_key.as_str().to_string());
        }
        if let Some(category) = &filter.category {
            conditions.push("json_extract(n.meta, '$.category') = ?".to_string());
            binds.push(category.clone());
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if search.chars().all(|c| c.is_ascii_digit()) {
                conditions.push("n.source_article_id LIKE ?".to_string());
            } else {
                conditions.push("n.url LIKE ?".to_string());
            }
            binds.push(format!("%{search}%"));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!(
            "SELECT COUNT(*) AS n FROM newslist n JOIN news_sources s ON s.id = n.source_id {where_clause}"
        );
        let mut count_query = sqlx::query(&count_sql);
        for bind in &binds {
            count_query = count_query.bind(bind);
        }
        let total: i64 = count_query.fetch_one(&*self.pool).await?.get("n");

        let limit = filter.limit.clamp(1, 100) as i64;
        let offset = i64::from(filter.page.saturating_sub(1)) * limit;
        let page_sql =
            format!("{SELECT_ENTRY} {where_clause} ORDER BY n.created_at DESC LIMIT ? OFFSET ?");
        let mut page_query = sqlx::query(&page_sql);
        for bind in &binds {
            page_query = page_query.bind(bind);
        }
        let rows = page_query.bind(limit).bind(offset).fetch_all(&*self.pool).await?;
        let entries = rows.iter().map(map_entry).collect::<Result<Vec<_>>>()?;
        Ok((entries, total))
    }

    /// Per-status totals for the operator dashboard.
    pub async fn status_counts(&self) -> Result<Vec<(NewslistStatus, i64)>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM newslist GROUP BY status")
            .fetch_all(&*self.pool)
            .await?;
        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.get("status");
            if let Ok(status) = status.parse::<NewslistStatus>() {
                counts.push((status, row.get("n")));
            }
        }
        Ok(counts)
    }
}

const SELECT_ENTRY: &str = r#"
    SELECT n.id, n.source_id, s.source_key, n.source_article_id, n.url, n.status,
           n.attempt_count, n.last_processed_at, n.error_log, n.resolved_article_id,
           n.meta, n.created_at
    FROM newslist n
    JOIN news_sources s ON s.id = n.source_id
"#;

fn map_entry(row: &sqlx::sqlite::SqliteRow) -> Result<NewslistEntry> {
    let status: String = row.get("status");
    let meta: Option<String> = row.get("meta");
    Ok(NewslistEntry {
        id: row.get("id"),
        source_id: row.get("source_id"),
        source_key: row.get("source_key"),
        source_article_id: row.get("source_article_id"),
        url: row.get("url"),
        status: status
            .parse::<NewslistStatus>()
            .map_err(|e| anyhow::anyhow!(e))?,
        attempt_count: row.get("attempt_count"),
        last_processed_at: row.get("last_processed_at"),
        error_log: row.get("error_log"),
        resolved_article_id: row.get("resolved_article_id"),
        meta: meta.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: row.get("created_at"),
    })
}
