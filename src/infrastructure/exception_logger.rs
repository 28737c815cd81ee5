//! Fire-and-forget sink for structured failure records.
//!
//! Writes are best-effort: a failure to record an exception is itself
//! logged and swallowed, never surfaced to the pipeline.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

const TYPE_LIMIT: usize = 100;
const MESSAGE_LIMIT: usize = 5000;
const STACK_LIMIT: usize = 10_000;
const OPERATION_LIMIT: usize = 100;
const URL_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// One structured failure record.
#[derive(Debug, Clone)]
pub struct ExceptionRecord {
    pub error_type: String,
    pub error_message: String,
    pub error_stack: Option<String>,
    pub operation: Option<String>,
    pub source_key: Option<String>,
    pub article_id: Option<String>,
    pub article_url: Option<String>,
    pub severity: Severity,
    pub metadata: Option<serde_json::Value>,
}

impl ExceptionRecord {
    pub fn new(error_type: &str, message: &str, operation: &str) -> Self {
        Self {
            error_type: error_type.to_string(),
            error_message: message.to_string(),
            error_stack: None,
            operation: Some(operation.to_string()),
            source_key: None,
            article_id: None,
            article_url: None,
            severity: Severity::Error,
            metadata: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_source(mut self, source_key: &str) -> Self {
        self.source_key = Some(source_key.to_string());
        self
    }

    pub fn with_article(mut self, article_id: Option<&str>, url: Option<&str>) -> Self {
        self.article_id = article_id.map(str::to_string);
        self.article_url = url.map(str::to_string);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Clone)]
pub struct ExceptionLogger {
    pool: Arc<SqlitePool>,
}

impl ExceptionLogger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Record a failure. Never returns an error and never blocks the
    /// caller beyond the single insert.
    pub async fn log(&self, record: ExceptionRecord) {
        let result = sqlx::query(
            r#"
            INSERT INTO exception_logs
            (id, error_type, error_message, error_stack, operation, source_key,
             article_id, article_url, severity, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(clamp(&record.error_type, TYPE_LIMIT))
        .bind(clamp(&record.error_message, MESSAGE_LIMIT))
        .bind(record.error_stack.as_deref().map(|s| clamp(s, STACK_LIMIT)))
        .bind(record.operation.as_deref().map(|s| clamp(s, OPERATION_LIMIT)))
        .bind(&record.source_key)
        .bind(&record.article_id)
        .bind(record.article_url.as_deref().map(|s| clamp(s, URL_LIMIT)))
        .bind(record.severity.as_str())
        .bind(record.metadata.as_ref().map(ToString::to_string))
        .bind(Utc::now())
        .execute(&*self.pool)
        .await;

        if let Err(e) = result {
            warn!("Failed to write exception log ({}): {}", record.error_type, e);
        }
    }
}

fn clamp(value: &str, limit: usize) -> String {
    value.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_char_boundaries() {
        let long = "錯".repeat(TYPE_LIMIT + 50);
        assert_eq!(clamp(&long, TYPE_LIMIT).chars().count(), TYPE_LIMIT);
        assert_eq!(clamp("short", TYPE_LIMIT), "short");
    }
}
