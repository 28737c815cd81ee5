//! HTTP page fetcher with retry and typed navigation failures.
//!
//! The pipeline consumes fetching through the [`PageFetcher`] trait so
//! tests can inject a canned fetcher; [`HttpClient`] is the reqwest-backed
//! implementation used in production.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::infrastructure::config::CrawlerConfig;

/// Navigation failure for a single page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("empty response body from {url}")]
    EmptyBody { url: String },
}

/// Fetches a fully loaded page as an HTML string.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher with bounded retries and exponential backoff.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: CrawlerConfig,
}

impl HttpClient {
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    /// Single fetch attempt, mapped to a typed failure.
    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    timeout_secs: self.config.request_timeout_secs,
                }
            } else {
                FetchError::Network { url: url.to_string(), message: e.to_string() }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16(), url: url.to_string() });
        }

        let body = response.text().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if body.is_empty() {
            return Err(FetchError::EmptyBody { url: url.to_string() });
        }

        Ok(body)
    }

    fn is_retryable(error: &FetchError) -> bool {
        match error {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => matches!(
                StatusCode::from_u16(*status).ok(),
                Some(
                    StatusCode::REQUEST_TIMEOUT
                        | StatusCode::TOO_MANY_REQUESTS
                        | StatusCode::INTERNAL_SERVER_ERROR
                        | StatusCode::BAD_GATEWAY
                        | StatusCode::SERVICE_UNAVAILABLE
                        | StatusCode::GATEWAY_TIMEOUT
                )
            ),
            FetchError::EmptyBody { .. } => false,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn navigate(&self, url: &str) -> Result<String, FetchError> {
        let mut last_error = None;

        for attempt in 1..=self.config.max_retries {
            debug!("HTTP GET (attempt {}/{}): {}", attempt, self.config.max_retries, url);
            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!("Fetched {} bytes from {} on attempt {}", body.len(), url, attempt);
                    return Ok(body);
                }
                Err(e) => {
                    warn!("Attempt {} failed for {}: {}", attempt, url, e);
                    let retryable = Self::is_retryable(&e);
                    last_error = Some(e);
                    if retryable && attempt < self.config.max_retries {
                        // Exponential backoff
                        let delay_secs = 2_u64.pow(attempt - 1);
                        sleep(Duration::from_secs(delay_secs)).await;
                        continue;
                    }
                    break;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Network {
            url: url.to_string(),
            message: "no attempt was made".to_string(),
        }))
    }
}
