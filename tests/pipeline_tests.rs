//! Integration tests for the ingestion pipeline against a real sqlite
//! database: queue dedup, import idempotence, scheduler fairness and the
//! end-to-end crawl cycle over a canned fetcher.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tempfile::TempDir;

use news_curator::application::discovery::{DiscoveryTarget, LinkDiscovery};
use news_curator::application::import::{ImportOptions, ImportPipeline};
use news_curator::application::scheduler::CategoryScheduler;
use news_curator::application::worker::{BatchSelection, CrawlCycle, NewslistProcessor};
use news_curator::domain::article::ScrapedArticle;
use news_curator::domain::newslist::{CandidateLink, NewslistStatus};
use news_curator::infrastructure::article_repository::{ArticleRepository, SourceIdCache};
use news_curator::infrastructure::category_repository::CategoryRepository;
use news_curator::infrastructure::config::CrawlerConfig;
use news_curator::infrastructure::database_connection::DatabaseConnection;
use news_curator::infrastructure::exception_logger::ExceptionLogger;
use news_curator::infrastructure::http_client::{FetchError, PageFetcher};
use news_curator::infrastructure::newslist_repository::{NewslistFilter, NewslistRepository};
use news_curator::infrastructure::sources::SourceKey;

struct CannedFetcher {
    pages: HashMap<String, String>,
}

impl CannedFetcher {
    fn new(pages: Vec<(&str, String)>) -> Arc<Self> {
        Arc::new(Self {
            pages: pages.into_iter().map(|(url, html)| (url.to_string(), html)).collect(),
        })
    }

    fn empty() -> Arc<Self> {
        Arc::new(Self { pages: HashMap::new() })
    }
}

#[async_trait]
impl PageFetcher for CannedFetcher {
    async fn navigate(&self, url: &str) -> Result<String, FetchError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status { status: 404, url: url.to_string() })
    }
}

struct Fixture {
    _dir: TempDir,
    db: DatabaseConnection,
    categories: CategoryRepository,
    newslist: NewslistRepository,
    articles: ArticleRepository,
    source_ids: Arc<SourceIdCache>,
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        let db = DatabaseConnection::new(&url).await.expect("connect");
        db.migrate().await.expect("migrate");

        let categories = CategoryRepository::new(db.pool().clone());
        for key in SourceKey::all() {
            categories.ensure_source(key).await.expect("seed source");
        }

        Self {
            categories,
            newslist: NewslistRepository::new(db.pool().clone()),
            articles: ArticleRepository::new(db.pool().clone()),
            source_ids: Arc::new(SourceIdCache::new()),
            db,
            _dir: dir,
        }
    }

    async fn source_id(&self, key: SourceKey) -> String {
        self.categories.find_source_id(key).await.unwrap().expect("seeded source")
    }

    fn pipeline(&self) -> ImportPipeline {
        ImportPipeline::new(self.db.pool().clone(), self.source_ids.clone())
    }

    fn processor(&self, fetcher: Arc<dyn PageFetcher>) -> NewslistProcessor {
        let mut config = CrawlerConfig::default();
        config.request_delay_ms = 0;
        NewslistProcessor::new(
            fetcher,
            self.newslist.clone(),
            self.pipeline(),
            ExceptionLogger::new(self.db.pool().clone()),
            config,
        )
    }
}

fn scraped(article_id: &str, title: &str) -> ScrapedArticle {
    ScrapedArticle {
        article_id: Some(article_id.to_string()),
        title: title.to_string(),
        content: "first paragraph\n\n### a heading\n\nsecond paragraph\n\n".to_string(),
        author: Some("陳大文".to_string()),
        category: Some("港聞".to_string()),
        sub_category: None,
        published_date: "2025-12-03T11:31:54+08:00".to_string(),
        updated_date: None,
        main_image_url: Some("https://cdn.hk01.com/hero.jpg".to_string()),
        main_image_caption: None,
        gallery: vec![
            news_curator::domain::article::ScrapedImage {
                url: "https://cdn.hk01.com/body1.jpg".to_string(),
                caption: Some("body".to_string()),
            },
        ],
        tags: vec!["tag-a".to_string()],
        summary: Some("first paragraph".to_string()),
    }
}

fn candidate(id: &str) -> CandidateLink {
    CandidateLink {
        article_id: id.to_string(),
        url: format!("https://www.hk01.com/news/{id}/slug"),
        category: Some("news".to_string()),
        title: Some("slug".to_string()),
    }
}

#[tokio::test]
async fn import_is_idempotent_on_the_dedup_key() {
    let fx = Fixture::new().await;
    let pipeline = fx.pipeline();
    let article = scraped("60300150", "dedup me");
    let url = "https://www.hk01.com/news/60300150/slug";

    let first = pipeline
        .import_article(SourceKey::Hk01, &article, url, ImportOptions::default())
        .await;
    assert!(first.success);
    assert!(first.is_new);
    let article_id = first.article_id.expect("new article id");

    // Re-importing the same native id with different content is a no-op.
    let changed = scraped("60300150", "a different title");
    let second = pipeline
        .import_article(SourceKey::Hk01, &changed, url, ImportOptions::default())
        .await;
    assert!(second.success);
    assert!(!second.is_new);

    let source_id = fx.source_id(SourceKey::Hk01).await;
    assert_eq!(fx.articles.count_for_source(&source_id).await.unwrap(), 1);

    let stored = fx.articles.get_article(&article_id).await.unwrap().expect("stored row");
    assert_eq!(stored.title, "dedup me", "existing row must be left unmodified");
    assert_eq!(stored.published_date.as_deref(), Some("2025-12-03T11:31:54+08:00"));
    assert_eq!(stored.content.len(), 3);
    assert_eq!(stored.excerpt.as_deref(), Some("first paragraph"));
    assert_eq!(fx.articles.count_images(&article_id).await.unwrap(), 1);
}

#[tokio::test]
async fn upsert_ignores_rediscovered_candidates() {
    let fx = Fixture::new().await;
    let source_id = fx.source_id(SourceKey::Hk01).await;
    let batch = vec![candidate("1001"), candidate("1002")];

    let first = fx.newslist.upsert_candidates(&source_id, &batch, None).await.unwrap();
    assert_eq!((first.discovered, first.saved, first.duplicates), (2, 2, 0));

    // Re-discovery of the same ids is a no-op, never a new row.
    let second = fx.newslist.upsert_candidates(&source_id, &batch, None).await.unwrap();
    assert_eq!((second.discovered, second.saved, second.duplicates), (2, 0, 2));

    let counts = fx.newslist.status_counts().await.unwrap();
    assert_eq!(counts, vec![(NewslistStatus::Pending, 2)]);
}

#[tokio::test]
async fn scheduler_prefers_never_run_then_stalest() {
    let fx = Fixture::new().await;
    let source_id = fx.source_id(SourceKey::Hk01).await;
    let scheduler = CategoryScheduler::new(fx.categories.clone());

    let c1 = fx
        .categories
        .create_category(&source_id, "zone-1", "Zone 1", 100, None)
        .await
        .unwrap();
    let c2 = fx
        .categories
        .create_category(&source_id, "zone-2", "Zone 2", 100, None)
        .await
        .unwrap();
    fx.categories
        .update_last_run(&c2.id, Utc::now() - Duration::hours(1))
        .await
        .unwrap();

    // Never-run goes first
    let selected = scheduler.select_category(None, None).await.unwrap().unwrap();
    assert_eq!(selected.slug, "zone-1");

    scheduler.refresh_last_run(&c1.id, None).await.unwrap();
    let next = scheduler.select_category(None, None).await.unwrap().unwrap();
    assert_eq!(next.slug, "zone-2");
}

#[tokio::test]
async fn scheduler_explicit_slug_bypasses_rotation() {
    let fx = Fixture::new().await;
    let source_id = fx.source_id(SourceKey::Hk01).await;
    let scheduler = CategoryScheduler::new(fx.categories.clone());

    fx.categories
        .create_category(&source_id, "zone-fresh", "Fresh", 1, None)
        .await
        .unwrap();
    let manual = fx
        .categories
        .create_category(&source_id, "zone-manual", "Manual", 100, None)
        .await
        .unwrap();
    fx.categories.update_last_run(&manual.id, Utc::now()).await.unwrap();

    let selected = scheduler
        .select_category(None, Some("zone-manual"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(selected.slug, "zone-manual");
}

#[tokio::test]
async fn scheduler_provisions_default_category_when_empty() {
    let fx = Fixture::new().await;
    let scheduler = CategoryScheduler::new(fx.categories.clone());

    let selected = scheduler.select_category(None, None).await.unwrap().unwrap();
    assert_eq!(selected.slug, "hk01-auto");
    assert_eq!(selected.source_key, "hk01");
}

#[tokio::test]
async fn failed_entries_need_the_widened_eligible_set() {
    let fx = Fixture::new().await;
    let source_id = fx.source_id(SourceKey::Hk01).await;
    fx.newslist
        .upsert_candidates(&source_id, &[candidate("2001")], None)
        .await
        .unwrap();
    fx.newslist
        .mark_failed(&source_id, "2001", "boom", true)
        .await
        .unwrap();

    let pending_only = fx
        .newslist
        .fetch_eligible(&[NewslistStatus::Pending], 10)
        .await
        .unwrap();
    assert!(pending_only.is_empty());

    let forced = fx
        .newslist
        .fetch_eligible(&[NewslistStatus::Pending, NewslistStatus::Failed], 10)
        .await
        .unwrap();
    assert_eq!(forced.len(), 1);
    assert_eq!(forced[0].error_log.as_deref(), Some("boom"));
    assert_eq!(forced[0].attempt_count, 1);
}

#[tokio::test]
async fn import_transitions_the_queue_entry() {
    let fx = Fixture::new().await;
    let source_id = fx.source_id(SourceKey::Hk01).await;
    fx.newslist
        .upsert_candidates(&source_id, &[candidate("3001")], None)
        .await
        .unwrap();

    let pipeline = fx.pipeline();
    let result = pipeline
        .import_article(
            SourceKey::Hk01,
            &scraped("3001", "queued article"),
            "https://www.hk01.com/news/3001/slug",
            ImportOptions::default(),
        )
        .await;
    assert!(result.success && result.is_new);

    let entry = fx.newslist.find_entry(&source_id, "3001").await.unwrap().unwrap();
    assert_eq!(entry.status, NewslistStatus::Extracted);
    assert_eq!(entry.attempt_count, 1);
    assert_eq!(entry.resolved_article_id, result.article_id);
    assert!(entry.error_log.is_none());
    assert!(entry.last_processed_at.is_some());
}

#[tokio::test]
async fn import_can_opt_out_of_queue_bookkeeping() {
    let fx = Fixture::new().await;
    let source_id = fx.source_id(SourceKey::Hk01).await;
    fx.newslist
        .upsert_candidates(&source_id, &[candidate("3002")], None)
        .await
        .unwrap();

    let options = ImportOptions { manage_newslist: false, skip_processing_mark: false };
    let result = fx
        .pipeline()
        .import_article(
            SourceKey::Hk01,
            &scraped("3002", "unmanaged"),
            "https://www.hk01.com/news/3002/slug",
            options,
        )
        .await;
    assert!(result.success);

    let entry = fx.newslist.find_entry(&source_id, "3002").await.unwrap().unwrap();
    assert_eq!(entry.status, NewslistStatus::Pending);
    assert_eq!(entry.attempt_count, 0);
}

#[tokio::test]
async fn fetch_failure_fails_the_entry_not_the_batch() {
    let fx = Fixture::new().await;
    let source_id = fx.source_id(SourceKey::Hk01).await;
    fx.newslist
        .upsert_candidates(&source_id, &[candidate("4001"), candidate("4002")], None)
        .await
        .unwrap();

    // 4002 resolves, 4001 does not.
    let fetcher = CannedFetcher::new(vec![(
        "https://www.hk01.com/news/4002/slug",
        article_page("4002", "survivor"),
    )]);
    let processor = fx.processor(fetcher);

    let summary = processor.process_batch(&BatchSelection::pending(10)).await.unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.imported, 1);
    assert_eq!(summary.failed, 1);

    let failed = fx.newslist.find_entry(&source_id, "4001").await.unwrap().unwrap();
    assert_eq!(failed.status, NewslistStatus::Failed);
    assert_eq!(failed.attempt_count, 1);
    assert!(failed.error_log.as_deref().unwrap_or_default().contains("404"));

    let imported = fx.newslist.find_entry(&source_id, "4002").await.unwrap().unwrap();
    assert_eq!(imported.status, NewslistStatus::Extracted);
}

#[tokio::test]
async fn extraction_failure_records_the_offending_step() {
    let fx = Fixture::new().await;
    let source_id = fx.source_id(SourceKey::Hk01).await;
    fx.newslist
        .upsert_candidates(&source_id, &[candidate("4003")], None)
        .await
        .unwrap();

    let fetcher = CannedFetcher::new(vec![(
        "https://www.hk01.com/news/4003/slug",
        "<html><body><p>no title at all</p></body></html>".to_string(),
    )]);
    let summary = fx
        .processor(fetcher)
        .process_batch(&BatchSelection::pending(10))
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);

    let entry = fx.newslist.find_entry(&source_id, "4003").await.unwrap().unwrap();
    assert_eq!(entry.status, NewslistStatus::Failed);
    let error = entry.error_log.unwrap_or_default();
    assert!(error.contains("title"), "error should name the failed field: {error}");
    assert!(error.contains("h1#articleTitle"), "error should name the selector: {error}");
}

#[tokio::test]
async fn forced_batch_reprocesses_failed_entries() {
    let fx = Fixture::new().await;
    let source_id = fx.source_id(SourceKey::Hk01).await;
    fx.newslist
        .upsert_candidates(&source_id, &[candidate("5001")], None)
        .await
        .unwrap();

    // First pass: nothing resolves, the entry fails.
    let summary = fx
        .processor(CannedFetcher::empty())
        .process_batch(&BatchSelection::pending(10))
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);

    // A plain pending batch skips it; a forced batch re-attempts from
    // scratch and succeeds once the page loads.
    let fetcher = CannedFetcher::new(vec![(
        "https://www.hk01.com/news/5001/slug",
        article_page("5001", "recovered"),
    )]);
    let processor = fx.processor(fetcher);
    let skipped = processor.process_batch(&BatchSelection::pending(10)).await.unwrap();
    assert_eq!(skipped.processed, 0);

    let forced = processor.process_batch(&BatchSelection::forced(10)).await.unwrap();
    assert_eq!(forced.imported, 1);

    let entry = fx.newslist.find_entry(&source_id, "5001").await.unwrap().unwrap();
    assert_eq!(entry.status, NewslistStatus::Extracted);
    // fetch failure bumped once, the import's processing claim bumped again
    assert_eq!(entry.attempt_count, 2);
    assert!(entry.error_log.is_none(), "failure reason is cleared on success");
}

#[tokio::test]
async fn explicit_id_batch_touches_only_the_requested_entries() {
    let fx = Fixture::new().await;
    let source_id = fx.source_id(SourceKey::Hk01).await;
    fx.newslist
        .upsert_candidates(&source_id, &[candidate("7001"), candidate("7002")], None)
        .await
        .unwrap();
    let wanted = fx.newslist.find_entry(&source_id, "7001").await.unwrap().unwrap();

    let fetcher = CannedFetcher::new(vec![(
        "https://www.hk01.com/news/7001/slug",
        article_page("7001", "picked"),
    )]);
    let summary = fx
        .processor(fetcher)
        .process_batch(&BatchSelection::Ids(vec![wanted.id]))
        .await
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.imported, 1);

    let untouched = fx.newslist.find_entry(&source_id, "7002").await.unwrap().unwrap();
    assert_eq!(untouched.status, NewslistStatus::Pending);
    assert_eq!(untouched.attempt_count, 0);
}

#[tokio::test]
async fn operator_listing_filters_by_status_and_search() {
    let fx = Fixture::new().await;
    let source_id = fx.source_id(SourceKey::Hk01).await;
    fx.newslist
        .upsert_candidates(&source_id, &[candidate("6001"), candidate("6002")], None)
        .await
        .unwrap();
    fx.newslist
        .mark_failed(&source_id, "6002", "kaput", true)
        .await
        .unwrap();

    let (failed_only, total) = fx
        .newslist
        .list(&NewslistFilter {
            status: Some(NewslistStatus::Failed),
            page: 1,
            limit: 20,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(failed_only[0].source_article_id, "6002");

    let (by_id, _) = fx
        .newslist
        .list(&NewslistFilter {
            search: Some("6001".to_string()),
            page: 1,
            limit: 20,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_id.len(), 1);
    assert_eq!(by_id[0].source_article_id, "6001");
}

#[tokio::test]
async fn crawl_cycle_discovers_queues_and_imports() {
    let fx = Fixture::new().await;
    let source_id = fx.source_id(SourceKey::Hk01).await;
    fx.categories
        .create_category(
            &source_id,
            "zone-3",
            "Zone 3",
            1,
            Some("https://www.hk01.com/zone/3"),
        )
        .await
        .unwrap();

    let listing = r#"
        <html><body>
        <a href="/news/60300150/first-article">one</a>
        <a href="/news/60300150/first-article?utm_source=home">one again</a>
        <a href="/news/60300151/second-article">two</a>
        <a href="/zone/3/latest">index page</a>
        </body></html>
    "#;
    let fetcher = CannedFetcher::new(vec![
        ("https://www.hk01.com/zone/3", listing.to_string()),
        ("https://www.hk01.com/news/60300150/first-article", article_page("60300150", "first")),
        ("https://www.hk01.com/news/60300151/second-article", article_page("60300151", "second")),
    ]);

    let cycle = CrawlCycle {
        scheduler: CategoryScheduler::new(fx.categories.clone()),
        discovery: LinkDiscovery::new(fetcher.clone()),
        processor: fx.processor(fetcher.clone()),
        newslist: fx.newslist.clone(),
    };

    let report = cycle.run(Some(SourceKey::Hk01), None, 25).await.unwrap();
    assert_eq!(report.category_slug.as_deref(), Some("zone-3"));
    assert_eq!(report.discovered, 2);
    assert_eq!(report.saved, 2);
    let processing = report.processing.unwrap();
    assert_eq!(processing.imported, 2);
    assert_eq!(processing.failed, 0);

    assert_eq!(fx.articles.count_for_source(&source_id).await.unwrap(), 2);
    let selected = fx.categories.by_slug("zone-3").await.unwrap().unwrap();
    assert!(selected.last_run_at.is_some(), "crawl must rotate fairness forward");

    // Second cycle: everything is a duplicate and the queue is drained.
    let again = cycle.run(Some(SourceKey::Hk01), None, 25).await.unwrap();
    assert_eq!(again.saved, 0);
    assert_eq!(again.duplicates, 2);
    assert_eq!(again.processing.unwrap().processed, 0);
    assert_eq!(fx.articles.count_for_source(&source_id).await.unwrap(), 2);
}

#[tokio::test]
async fn discovery_partial_results_are_usable() {
    // A run over the default zone set where every page 404s yields an
    // empty, valid result rather than an error.
    let discovery = LinkDiscovery::new(CannedFetcher::empty());
    let candidates = discovery
        .discover(SourceKey::Hk01, &DiscoveryTarget::AllCategories)
        .await;
    assert!(candidates.is_empty());
}

fn article_page(id: &str, title: &str) -> String {
    format!(
        r#"
        <html><body>
        <h1 id="articleTitle">{title}</h1>
        <div data-article-id="{id}"></div>
        <div data-testid="article-publish-info">
            <time datetime="2025-12-03T11:31:54+08:00">3 Dec</time>
        </div>
        <article id="article-content-section">
            <p>paragraph one of {title}</p>
            <h3>heading of {title}</h3>
            <p>paragraph two of {title}</p>
        </article>
        </body></html>
        "#
    )
}
