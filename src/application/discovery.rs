//! Link discovery: turn listing pages into deduplicated candidate links.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::domain::newslist::CandidateLink;
use crate::infrastructure::http_client::PageFetcher;
use crate::infrastructure::parsing::link_parser;
use crate::infrastructure::sources::{NewsSource, SourceKey};

/// What to crawl: the source's whole default listing set, or one
/// caller-provided listing URL (a category's own page).
#[derive(Debug, Clone)]
pub enum DiscoveryTarget {
    AllCategories,
    SingleUrl(String),
}

pub struct LinkDiscovery {
    fetcher: Arc<dyn PageFetcher>,
}

impl LinkDiscovery {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch the target listing pages and extract unique candidate links.
    ///
    /// Per-page failures are logged and skipped; a partial result is a
    /// valid result. Duplicate native ids across pages coalesce to the
    /// first occurrence. Output is sorted by native id descending as a
    /// cheap most-recent-first heuristic.
    pub async fn discover(&self, key: SourceKey, target: &DiscoveryTarget) -> Vec<CandidateLink> {
        let urls: Vec<String> = match target {
            DiscoveryTarget::SingleUrl(url) => vec![url.clone()],
            DiscoveryTarget::AllCategories => NewsSource::for_key(key).list_pages,
        };

        let fetches = urls.iter().map(|url| self.fetcher.navigate(url));
        let pages = join_all(fetches).await;

        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates: Vec<CandidateLink> = Vec::new();

        for (url, page) in urls.iter().zip(pages) {
            let html = match page {
                Ok(html) => html,
                Err(e) => {
                    warn!("Skipping listing page {}: {}", url, e);
                    continue;
                }
            };

            let mut added = 0usize;
            for candidate in link_parser::parse_listing(key, &html) {
                if seen.insert(candidate.article_id.clone()) {
                    candidates.push(candidate);
                    added += 1;
                }
            }
            debug!("Listing page {} yielded {} new candidates", url, added);
        }

        candidates.sort_by(|a, b| id_descending(&a.article_id, &b.article_id));
        debug!(
            "Discovery for {} finished with {} unique candidates",
            key.as_str(),
            candidates.len()
        );
        candidates
    }
}

/// Native ids are assigned sequentially by the sources, so numeric
/// descending approximates newest-first; non-numeric ids fall back to
/// lexicographic order.
fn id_descending(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(left), Ok(right)) => right.cmp(&left),
        _ => b.cmp(a),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::FetchError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct CannedFetcher {
        pages: HashMap<String, String>,
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

    fn discovery(pages: Vec<(&str, &str)>) -> LinkDiscovery {
        let pages = pages
            .into_iter()
            .map(|(url, html)| (url.to_string(), html.to_string()))
            .collect();
        LinkDiscovery::new(Arc::new(CannedFetcher { pages }))
    }

    #[tokio::test]
    async fn coalesces_duplicate_ids_across_query_strings() {
        let html = r#"
            <html><body>
            <a href="/%E6%B8%AF%E8%81%9E/60300150/story?utm_source=home">a</a>
            <a href="/%E6%B8%AF%E8%81%9E/60300150/story?utm_source=sidebar">b</a>
            <a href="/%E6%B8%AF%E8%81%9E/60300151/other-story">c</a>
            </body></html>
        "#;
        let discovery = discovery(vec![("https://www.hk01.com/zone/1", html)]);
        let target = DiscoveryTarget::SingleUrl("https://www.hk01.com/zone/1".to_string());

        let candidates = discovery.discover(SourceKey::Hk01, &target).await;
        let ids: Vec<&str> = candidates.iter().map(|c| c.article_id.as_str()).collect();
        assert_eq!(ids, vec!["60300151", "60300150"]);
    }

    #[tokio::test]
    async fn failed_pages_do_not_abort_the_run() {
        let html = r#"<html><body><a href="/news/10000001/ok">x</a></body></html>"#;
        // Only one of the twelve default zone pages resolves.
        let discovery = discovery(vec![("https://www.hk01.com/zone/3", html)]);

        let candidates = discovery
            .discover(SourceKey::Hk01, &DiscoveryTarget::AllCategories)
            .await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].article_id, "10000001");
    }

    #[test]
    fn newest_first_ordering_is_numeric_aware() {
        assert_eq!(id_descending("9", "10"), std::cmp::Ordering::Greater);
        assert_eq!(id_descending("10", "9"), std::cmp::Ordering::Less);
        assert_eq!(id_descending("abc", "abd"), std::cmp::Ordering::Greater);
    }
}
