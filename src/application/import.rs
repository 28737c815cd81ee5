//! Import pipeline: deduplicated persistence of extracted articles with
//! newslist bookkeeping.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::domain::article::ScrapedArticle;
use crate::infrastructure::article_repository::{ArticleRepository, SourceIdCache};
use crate::infrastructure::exception_logger::{ExceptionLogger, ExceptionRecord};
use crate::infrastructure::newslist_repository::NewslistRepository;
use crate::infrastructure::sources::SourceKey;

/// Bookkeeping behavior of one import call.
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Whether this call owns the newslist status transitions at all.
    /// Callers that manage state themselves opt out entirely.
    pub manage_newslist: bool,
    /// Skip the optimistic `processing` mark (and its attempt increment)
    /// when the surrounding workflow already claimed the entry.
    pub skip_processing_mark: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { manage_newslist: true, skip_processing_mark: false }
    }
}

/// Caller-facing outcome; never an Err - persistence failures are folded
/// into `success: false` with the message preserved.
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub success: bool,
    pub is_new: bool,
    pub article_id: Option<String>,
    pub message: String,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct ImportPipeline {
    pool: SqlitePool,
    articles: ArticleRepository,
    newslist: NewslistRepository,
    source_ids: Arc<SourceIdCache>,
    exceptions: ExceptionLogger,
}

impl ImportPipeline {
    pub fn new(pool: SqlitePool, source_ids: Arc<SourceIdCache>) -> Self {
        Self {
            articles: ArticleRepository::new(pool.clone()),
            newslist: NewslistRepository::new(pool.clone()),
            exceptions: ExceptionLogger::new(pool.clone()),
            pool,
            source_ids,
        }
    }

    /// Import one extracted article.
    ///
    /// Dedup on (source, native id): an already-persisted id short-circuits
    /// to `is_new: false` and still idempotently marks the queue entry
    /// extracted. All newslist writes are best-effort logging; their own
    /// failures never mask the import outcome.
    pub async fn import_article(
        &self,
        key: SourceKey,
        scraped: &ScrapedArticle,
        source_url: &str,
        options: ImportOptions,
    ) -> ImportResult {
        let native_id = scraped.article_id.clone().unwrap_or_default();
        let manage = options.manage_newslist && !native_id.is_empty();

        let source_id = match self.source_ids.resolve(&self.pool, key).await {
            Ok(id) => id,
            Err(e) => return self.fail_without_source(key, &native_id, source_url, e).await,
        };

        // Optimistic claim so observers can see work in flight.
        if manage && !options.skip_processing_mark {
            if let Err(e) = self.newslist.mark_processing(&source_id, &native_id).await {
                warn!("Failed to mark newslist entry {} processing: {}", native_id, e);
            }
        }

        match self.run_import(&source_id, &native_id, scraped, source_url).await {
            Ok(Some(article_id)) => {
                if manage {
                    if let Err(e) = self
                        .newslist
                        .mark_extracted(&source_id, &native_id, Some(&article_id))
                        .await
                    {
                        warn!("Failed to mark newslist entry {} extracted: {}", native_id, e);
                    }
                }
                info!("Imported article {} as {}", native_id, article_id);
                ImportResult {
                    success: true,
                    is_new: true,
                    article_id: Some(article_id),
                    message: format!("Article {native_id} imported successfully"),
                    error: None,
                }
            }
            Ok(None) => {
                if manage {
                    if let Err(e) = self.newslist.mark_extracted(&source_id, &native_id, None).await
                    {
                        warn!("Failed to mark newslist entry {} existing: {}", native_id, e);
                    }
                }
                ImportResult {
                    success: true,
                    is_new: false,
                    article_id: None,
                    message: format!("Article {native_id} already exists in database"),
                    error: None,
                }
            }
            Err(e) => {
                self.fail_with_source(key, &source_id, &native_id, source_url, manage, e)
                    .await
            }
        }
    }

    /// Returns `Some(id)` for a newly persisted article, `None` when the
    /// dedup key already exists.
    async fn run_import(
        &self,
        source_id: &str,
        native_id: &str,
        scraped: &ScrapedArticle,
        source_url: &str,
    ) -> Result<Option<String>> {
        if !native_id.is_empty()
            && self.articles.find_by_dedup_key(source_id, native_id).await?.is_some()
        {
            return Ok(None);
        }

        let article_id = self
            .articles
            .insert_article(source_id, native_id, source_url, scraped)
            .await?;

        if !scraped.gallery.is_empty() {
            self.articles.insert_images(&article_id, &scraped.gallery).await?;
        }

        Ok(Some(article_id))
    }

    /// The source row itself is unresolvable; there is no queue entry to
    /// update, only the audit trail.
    async fn fail_without_source(
        &self,
        key: SourceKey,
        native_id: &str,
        source_url: &str,
        error: anyhow::Error,
    ) -> ImportResult {
        let message = format!("{error:#}");
        self.exceptions
            .log(
                ExceptionRecord::new("ImportError", &message, "import_article")
                    .with_source(key.as_str())
                    .with_article(Some(native_id), Some(source_url)),
            )
            .await;
        ImportResult {
            success: false,
            is_new: false,
            article_id: None,
            message: "Failed to import article".to_string(),
            error: Some(message),
        }
    }

    async fn fail_with_source(
        &self,
        key: SourceKey,
        source_id: &str,
        native_id: &str,
        source_url: &str,
        manage: bool,
        error: anyhow::Error,
    ) -> ImportResult {
        // Keep the full cause chain for operator triage
        let message = format!("{error:#}");
        warn!("Import of article {} failed: {}", native_id, message);

        if manage {
            // The processing mark already counted this attempt.
            if let Err(e) = self.newslist.mark_failed(source_id, native_id, &message, false).await {
                warn!("Failed to mark newslist entry {} failed: {}", native_id, e);
            }
        }

        self.exceptions
            .log(
                ExceptionRecord::new("ImportError", &message, "import_article")
                    .with_source(key.as_str())
                    .with_article(Some(native_id), Some(source_url)),
            )
            .await;

        ImportResult {
            success: false,
            is_new: false,
            article_id: None,
            message: "Failed to import article".to_string(),
            error: Some(message),
        }
    }
}
