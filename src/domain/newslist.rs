//! Newslist work-queue entities: candidate links and their lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a discovered URL.
///
/// `pending` on discovery, `processing` while a worker holds it, then
/// `extracted` (article imported or already known) or `failed`. Failed
/// entries are only re-processed when a caller explicitly widens the
/// eligible status set; the scheduler never retries them on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewslistStatus {
    Pending,
    Processing,
    Extracted,
    Failed,
}

impl NewslistStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Extracted => "extracted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for NewslistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NewslistStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "extracted" => Ok(Self::Extracted),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown newslist status '{other}'")),
        }
    }
}

/// Ephemeral link discovery result; input to a newslist upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLink {
    /// Article identifier as assigned by the source site.
    pub article_id: String,
    pub url: String,
    pub category: Option<String>,
    pub title: Option<String>,
}

/// One unit of work in the queue. Unique per (source_id, source_article_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewslistEntry {
    pub id: String,
    pub source_id: String,
    /// Source key joined in from the sources table, for config dispatch.
    pub source_key: String,
    pub source_article_id: String,
    pub url: String,
    pub status: NewslistStatus,
    pub attempt_count: i64,
    pub last_processed_at: Option<DateTime<Utc>>,
    /// Last failure reason; cleared when an attempt starts.
    pub error_log: Option<String>,
    /// Set once the article row exists.
    pub resolved_article_id: Option<String>,
    /// Category label, title slug, scheduling provenance.
    pub meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
