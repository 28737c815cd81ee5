//! Category scheduler: decides which crawl target runs next.
//!
//! Selection is a read; rotation only moves forward when the caller
//! reports back through [`CategoryScheduler::refresh_last_run`] after the
//! crawl attempt, success or failure.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::category::ScraperCategory;
use crate::infrastructure::category_repository::{CategoryRepository, FALLBACK_SOURCE_KEY};
use crate::infrastructure::sources::SourceKey;

const ROTATION_WINDOW: usize = 20;

#[derive(Clone)]
pub struct CategoryScheduler {
    categories: CategoryRepository,
}

impl CategoryScheduler {
    pub fn new(categories: CategoryRepository) -> Self {
        Self { categories }
    }

    /// Pick the next category to crawl.
    ///
    /// An explicit, enabled slug bypasses rotation (manual/forced runs).
    /// Otherwise enabled categories are taken stalest-first: never-run
    /// before longest-ago, priority breaking ties. `None` means "nothing
    /// to do", not a fault.
    pub async fn select_category(
        &self,
        source: Option<SourceKey>,
        slug: Option<&str>,
    ) -> Result<Option<ScraperCategory>> {
        if let Some(slug) = slug {
            if let Some(category) = self.categories.by_slug(slug).await? {
                if category.is_enabled {
                    debug!("Scheduler bypassing rotation for explicit slug '{}'", slug);
                    return Ok(Some(category));
                }
            }
        }

        match source {
            Some(key) => self.select_for_source(key).await,
            None => self.select_any().await,
        }
    }

    async fn select_any(&self) -> Result<Option<ScraperCategory>> {
        let candidates = self.categories.enabled_ordered(None, 1).await?;
        if let Some(category) = candidates.into_iter().next() {
            return Ok(Some(category));
        }

        // Empty setup: provision the fallback category rather than stall.
        let provisioned = self.categories.ensure_default_category().await?;
        Ok(provisioned.is_enabled.then_some(provisioned))
    }

    async fn select_for_source(&self, key: SourceKey) -> Result<Option<ScraperCategory>> {
        if key == FALLBACK_SOURCE_KEY {
            self.categories.ensure_default_category().await?;
        }

        let Some(source_id) = self.categories.find_source_id(key).await? else {
            return Ok(None);
        };

        let candidates = self
            .categories
            .enabled_ordered(Some(&source_id), ROTATION_WINDOW)
            .await?;

        // Prefer the stalest category that knows its own listing URL;
        // the others would force a full default-set crawl.
        if let Some(category) = candidates.iter().find(|c| c.listing_url().is_some()) {
            return Ok(Some(category.clone()));
        }

        if key == FALLBACK_SOURCE_KEY {
            let provisioned = self.categories.ensure_default_category().await?;
            return Ok(provisioned.is_enabled.then_some(provisioned));
        }

        Ok(None)
    }

    /// Rotate fairness forward after a crawl attempt.
    pub async fn refresh_last_run(
        &self,
        category_id: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.categories
            .update_last_run(category_id, timestamp.unwrap_or_else(Utc::now))
            .await
    }
}
