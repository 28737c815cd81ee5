//! Application layer: the use cases that wire discovery, extraction and
//! import into the crawl cycle.

pub mod discovery;
pub mod import;
pub mod scheduler;
pub mod worker;

pub use discovery::{DiscoveryTarget, LinkDiscovery};
pub use import::{ImportOptions, ImportPipeline, ImportResult};
pub use scheduler::CategoryScheduler;
pub use worker::{BatchSelection, CrawlCycle, CrawlCycleReport, NewslistProcessor, ProcessSummary};
