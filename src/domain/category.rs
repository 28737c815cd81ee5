//! Scraper categories: the crawlable subsections a scheduler rotates over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A crawlable zone/channel/section of a source.
///
/// Created at setup time (or lazily defaulted for the fallback source);
/// the scheduler only ever mutates `last_run_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperCategory {
    pub id: String,
    pub source_id: String,
    /// Source key joined in from the sources table.
    pub source_key: String,
    pub slug: String,
    pub name: String,
    /// Lower is more urgent; breaks ties among equally stale categories.
    pub priority: i64,
    pub is_enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Free-form; holds the concrete listing URL since sources differ in
    /// how categories map to URLs.
    pub metadata: Option<serde_json::Value>,
}

impl ScraperCategory {
    /// The category's own listing URL, when its metadata carries one.
    pub fn listing_url(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.get("listing_url"))
            .and_then(|value| value.as_str())
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(metadata: Option<serde_json::Value>) -> ScraperCategory {
        ScraperCategory {
            id: "c1".into(),
            source_id: "s1".into(),
            source_key: "hk01".into(),
            slug: "hk01-auto".into(),
            name: "HK01 Default".into(),
            priority: 10,
            is_enabled: true,
            last_run_at: None,
            metadata,
        }
    }

    #[test]
    fn listing_url_reads_metadata() {
        let cat = category(Some(serde_json::json!({ "listing_url": "https://www.hk01.com/zone/3" })));
        assert_eq!(cat.listing_url(), Some("https://www.hk01.com/zone/3"));
        assert_eq!(category(None).listing_url(), None);
        assert_eq!(category(Some(serde_json::json!({ "listing_url": "" }))).listing_url(), None);
    }
}
