//! news-curator - Hong Kong news ingestion pipeline
//!
//! This crate crawls configured news sources (HK01, Ming Pao), discovers
//! candidate article URLs from their listing pages, extracts normalized
//! articles with selector-driven parsers, and imports them into a SQLite
//! store with deduplication by (source, native article id).

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;

// Re-export the main pipeline entry points for easier access
pub use application::scheduler::CategoryScheduler;
pub use application::discovery::{DiscoveryTarget, LinkDiscovery};
pub use application::import::{ImportOptions, ImportPipeline, ImportResult};
pub use application::worker::{BatchSelection, CrawlCycle, NewslistProcessor};
pub use infrastructure::sources::{NewsSource, SourceKey};
