//! Infrastructure layer: source registry, HTTP fetch, persistence and parsing.

pub mod article_repository;
pub mod category_repository;
pub mod config;
pub mod database_connection;
pub mod exception_logger;
pub mod http_client;
pub mod logging;
pub mod newslist_repository;
pub mod parsing;
pub mod sources;

// Re-export commonly used items
pub use article_repository::{ArticleRepository, SourceIdCache};
pub use category_repository::CategoryRepository;
pub use config::CrawlerConfig;
pub use database_connection::DatabaseConnection;
pub use exception_logger::{ExceptionLogger, ExceptionRecord, Severity};
pub use http_client::{FetchError, HttpClient, PageFetcher};
pub use logging::init_logging;
pub use newslist_repository::{NewslistFilter, NewslistRepository, UpsertReport};
pub use parsing::{ArticleParser, ExtractionError, ScrapeOutcome};
pub use sources::{NewsSource, SourceKey, UnknownSourceError};
