//! Newslist processing and the crawl cycle.
//!
//! The processor drains a small batch of queue entries sequentially over
//! one shared fetcher; a page that fails to load or parse fails that
//! entry, never the batch. The crawl cycle strings scheduler, discovery,
//! queueing and processing together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::application::discovery::{DiscoveryTarget, LinkDiscovery};
use crate::application::import::{ImportOptions, ImportPipeline};
use crate::application::scheduler::CategoryScheduler;
use crate::domain::newslist::{NewslistEntry, NewslistStatus};
use crate::infrastructure::config::CrawlerConfig;
use crate::infrastructure::exception_logger::{ExceptionLogger, ExceptionRecord};
use crate::infrastructure::http_client::PageFetcher;
use crate::infrastructure::newslist_repository::NewslistRepository;
use crate::infrastructure::parsing::ArticleParser;
use crate::infrastructure::sources::SourceKey;

/// Which queue entries a batch run works on.
#[derive(Debug, Clone)]
pub enum BatchSelection {
    /// Explicit entry ids (operator-driven reruns).
    Ids(Vec<String>),
    /// Pull up to `limit` entries whose status is in the eligible set:
    /// `{pending}` normally, `{pending, failed}` when forcing retries.
    Eligible { statuses: Vec<NewslistStatus>, limit: usize },
}

impl BatchSelection {
    pub fn pending(limit: usize) -> Self {
        Self::Eligible { statuses: vec![NewslistStatus::Pending], limit }
    }

    pub fn forced(limit: usize) -> Self {
        Self::Eligible { statuses: vec![NewslistStatus::Pending, NewslistStatus::Failed], limit }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryOutcome {
    Imported,
    Existing,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryResult {
    pub id: String,
    pub source_article_id: String,
    pub outcome: EntryOutcome,
    pub message: String,
    pub article_id: Option<String>,
}

/// Batch summary: partial success is the expected common case.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessSummary {
    pub processed: usize,
    pub imported: usize,
    pub existing: usize,
    pub failed: usize,
    pub results: Vec<EntryResult>,
}

pub struct NewslistProcessor {
    fetcher: Arc<dyn PageFetcher>,
    newslist: NewslistRepository,
    pipeline: ImportPipeline,
    exceptions: ExceptionLogger,
    config: CrawlerConfig,
}

impl NewslistProcessor {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        newslist: NewslistRepository,
        pipeline: ImportPipeline,
        exceptions: ExceptionLogger,
        config: CrawlerConfig,
    ) -> Self {
        Self { fetcher, newslist, pipeline, exceptions, config }
    }

    /// Process a batch of queue entries, one at a time.
    pub async fn process_batch(&self, selection: &BatchSelection) -> Result<ProcessSummary> {
        let entries = match selection {
            BatchSelection::Ids(ids) => self.newslist.fetch_by_ids(ids).await?,
            BatchSelection::Eligible { statuses, limit } => {
                let limit = (*limit).min(self.config.max_batch_size);
                self.newslist.fetch_eligible(statuses, limit).await?
            }
        };

        let mut summary = ProcessSummary { processed: entries.len(), ..Default::default() };
        let mut parsers: HashMap<SourceKey, ArticleParser> = HashMap::new();

        for (index, entry) in entries.iter().enumerate() {
            if index > 0 && self.config.request_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.request_delay_ms)).await;
            }

            let result = self.process_entry(entry, &mut parsers).await;
            match result.outcome {
                EntryOutcome::Imported => summary.imported += 1,
                EntryOutcome::Existing => summary.existing += 1,
                EntryOutcome::Failed => summary.failed += 1,
            }
            summary.results.push(result);
        }

        info!(
            "Processed {} newslist entries: {} imported, {} existing, {} failed",
            summary.processed, summary.imported, summary.existing, summary.failed
        );
        Ok(summary)
    }

    async fn process_entry(
        &self,
        entry: &NewslistEntry,
        parsers: &mut HashMap<SourceKey, ArticleParser>,
    ) -> EntryResult {
        let key = match SourceKey::parse(&entry.source_key) {
            Ok(key) => key,
            Err(e) => return self.fail_entry(entry, true, "resolve_source", &e.to_string()).await,
        };

        let html = match self.fetcher.navigate(&entry.url).await {
            Ok(html) => html,
            Err(e) => return self.fail_entry(entry, true, "fetch_article", &e.to_string()).await,
        };

        let parser = match parsers.entry(key) {
            std::collections::hash_map::Entry::Occupied(occupied) => occupied.into_mut(),
            std::collections::hash_map::Entry::Vacant(vacant) => {
                match ArticleParser::for_source(key) {
                    Ok(parser) => vacant.insert(parser),
                    Err(e) => {
                        return self
                            .fail_entry(entry, true, "build_parser", &e.to_string())
                            .await
                    }
                }
            }
        };

        let outcome = parser.scrape_article(&html, Some(&entry.url));
        let scraped = match outcome.result {
            Ok(scraped) => scraped,
            Err(e) => return self.fail_entry(entry, true, "extract_article", &e.to_string()).await,
        };

        let import = self
            .pipeline
            .import_article(key, &scraped, &entry.url, ImportOptions::default())
            .await;

        if !import.success {
            return EntryResult {
                id: entry.id.clone(),
                source_article_id: entry.source_article_id.clone(),
                outcome: EntryOutcome::Failed,
                message: import.error.unwrap_or(import.message),
                article_id: None,
            };
        }

        EntryResult {
            id: entry.id.clone(),
            source_article_id: scraped.article_id.unwrap_or_else(|| entry.source_article_id.clone()),
            outcome: if import.is_new { EntryOutcome::Imported } else { EntryOutcome::Existing },
            message: import.message,
            article_id: import.article_id,
        }
    }

    /// Record a pre-import failure. `bump_attempt` is set because no
    /// `processing` claim ran for this entry.
    async fn fail_entry(
        &self,
        entry: &NewslistEntry,
        bump_attempt: bool,
        operation: &str,
        message: &str,
    ) -> EntryResult {
        warn!("Entry {} ({}) failed at {}: {}", entry.id, entry.url, operation, message);

        if let Err(e) = self
            .newslist
            .mark_failed(&entry.source_id, &entry.source_article_id, message, bump_attempt)
            .await
        {
            warn!("Failed to record failure for entry {}: {}", entry.id, e);
        }

        self.exceptions
            .log(
                ExceptionRecord::new("ProcessingError", message, operation)
                    .with_source(&entry.source_key)
                    .with_article(Some(&entry.source_article_id), Some(&entry.url)),
            )
            .await;

        EntryResult {
            id: entry.id.clone(),
            source_article_id: entry.source_article_id.clone(),
            outcome: EntryOutcome::Failed,
            message: message.to_string(),
            article_id: None,
        }
    }
}

/// Outcome of one full crawl cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlCycleReport {
    pub category_slug: Option<String>,
    pub discovered: usize,
    pub saved: usize,
    pub duplicates: usize,
    pub processing: Option<ProcessSummary>,
}

/// Scheduler -> discovery -> queue -> process, the way a scheduled run
/// drives the pipeline end to end.
pub struct CrawlCycle {
    pub scheduler: CategoryScheduler,
    pub discovery: LinkDiscovery,
    pub processor: NewslistProcessor,
    pub newslist: NewslistRepository,
}

impl CrawlCycle {
    /// Run one cycle. Returns a no-op report when the scheduler has
    /// nothing to offer for the requested scope.
    pub async fn run(
        &self,
        source: Option<SourceKey>,
        slug: Option<&str>,
        batch_limit: usize,
    ) -> Result<CrawlCycleReport> {
        let Some(category) = self.scheduler.select_category(source, slug).await? else {
            info!("No enabled scraper category for the requested scope; nothing to do");
            return Ok(CrawlCycleReport {
                category_slug: None,
                discovered: 0,
                saved: 0,
                duplicates: 0,
                processing: None,
            });
        };

        let key = SourceKey::parse(&category.source_key)?;
        let target = match category.listing_url() {
            Some(url) => DiscoveryTarget::SingleUrl(url.to_string()),
            None => DiscoveryTarget::AllCategories,
        };

        info!(
            "Crawling category '{}' ({}) via {:?}",
            category.slug,
            key.as_str(),
            target
        );
        let candidates = self.discovery.discover(key, &target).await;

        let upsert = self
            .newslist
            .upsert_candidates(
                &category.source_id,
                &candidates,
                Some(&serde_json::json!({
                    "scheduler_category_slug": &category.slug,
                    "scheduler_category_name": &category.name,
                })),
            )
            .await;

        // Rotate fairness forward whether or not the crawl went well.
        if let Err(e) = self.scheduler.refresh_last_run(&category.id, None).await {
            warn!("Failed to update last_run_at for '{}': {}", category.slug, e);
        }

        let upsert = upsert?;
        info!(
            "Discovery for '{}': {} found, {} queued, {} duplicates",
            category.slug, upsert.discovered, upsert.saved, upsert.duplicates
        );

        let processing = self
            .processor
            .process_batch(&BatchSelection::pending(batch_limit))
            .await?;

        Ok(CrawlCycleReport {
            category_slug: Some(category.slug),
            discovered: upsert.discovered,
            saved: upsert.saved,
            duplicates: upsert.duplicates,
            processing: Some(processing),
        })
    }
}
