//! Thin binary: run one crawl cycle against the configured database.
//!
//! Usage: news-curator [source-key] [category-slug]
//! The database path comes from NEWS_CURATOR_DB (default ./data/news.db).

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use news_curator::application::discovery::LinkDiscovery;
use news_curator::application::import::ImportPipeline;
use news_curator::application::scheduler::CategoryScheduler;
use news_curator::application::worker::{CrawlCycle, NewslistProcessor};
use news_curator::infrastructure::article_repository::SourceIdCache;
use news_curator::infrastructure::category_repository::CategoryRepository;
use news_curator::infrastructure::config::CrawlerConfig;
use news_curator::infrastructure::database_connection::DatabaseConnection;
use news_curator::infrastructure::exception_logger::ExceptionLogger;
use news_curator::infrastructure::http_client::HttpClient;
use news_curator::infrastructure::logging::init_logging;
use news_curator::infrastructure::newslist_repository::NewslistRepository;
use news_curator::infrastructure::sources::SourceKey;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let mut args = std::env::args().skip(1);
    let source = match args.next() {
        Some(raw) => Some(SourceKey::parse(&raw)?),
        None => None,
    };
    let slug = args.next();

    let database_url = std::env::var("NEWS_CURATOR_DB")
        .map(|path| format!("sqlite:{path}"))
        .unwrap_or_else(|_| "sqlite:data/news.db".to_string());

    let db = DatabaseConnection::new(&database_url).await?;
    db.migrate().await?;

    let categories = CategoryRepository::new(db.pool().clone());
    for key in SourceKey::all() {
        categories.ensure_source(key).await?;
    }

    let config = CrawlerConfig::default();
    let fetcher = Arc::new(HttpClient::new(config.clone())?);
    let source_ids = Arc::new(SourceIdCache::new());
    let newslist = NewslistRepository::new(db.pool().clone());
    let pipeline = ImportPipeline::new(db.pool().clone(), source_ids);
    let exceptions = ExceptionLogger::new(db.pool().clone());

    let cycle = CrawlCycle {
        scheduler: CategoryScheduler::new(categories),
        discovery: LinkDiscovery::new(fetcher.clone()),
        processor: NewslistProcessor::new(
            fetcher,
            newslist.clone(),
            pipeline,
            exceptions,
            config.clone(),
        ),
        newslist,
    };

    let report = cycle.run(source, slug.as_deref(), config.max_batch_size).await?;
    match &report.category_slug {
        Some(slug) => info!(
            "Cycle for '{}' done: {} discovered, {} queued, {} duplicates",
            slug, report.discovered, report.saved, report.duplicates
        ),
        None => info!("Cycle finished with nothing to do"),
    }
    if let Some(processing) = &report.processing {
        info!(
            "Batch: {} processed, {} imported, {} existing, {} failed",
            processing.processed, processing.imported, processing.existing, processing.failed
        );
    }

    Ok(())
}
