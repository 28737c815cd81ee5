//! Crawler configuration.

use serde::{Deserialize, Serialize};

/// Tunables for fetching and batch processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User agent string for HTTP requests
    pub user_agent: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum number of retries for failed requests
    pub max_retries: u32,

    /// Delay between article fetches within a batch, to avoid tripping
    /// anti-scraping defenses
    pub request_delay_ms: u64,

    /// Hard cap on newslist entries processed per batch
    pub max_batch_size: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36".to_string(),
            request_timeout_secs: 15,
            max_retries: 3,
            request_delay_ms: 1000,
            max_batch_size: 25,
        }
    }
}
