//! Sync API Client - HTTP communication with the quote endpoint
//!
//! One fixed URL serves both directions:
//! - GET: fetch a batch of external records
//! - POST: upload locally changed quotes

use super::models::{RemotePost, SyncUpload};
use crate::quotes::{Quote, QuoteSource, SERVER_CATEGORY};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;

/// Number of remote records taken from each fetch
pub const FETCH_BATCH_SIZE: usize = 5;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// API client for the quote endpoint
pub struct SyncApiClient {
    client: Client,
    endpoint: String,
    /// Static bearer token sent with uploads
    api_token: Option<String>,
}

impl SyncApiClient {
    /// Create new API client with the default request timeout
    pub fn new(endpoint: &str, api_token: Option<String>) -> Result<Self, SyncApiError> {
        Self::with_timeout(endpoint, api_token, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        endpoint: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SyncApiError> {
        let parsed = url::Url::parse(endpoint)
            .map_err(|e| SyncApiError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncApiError::InvalidEndpoint(format!(
                "{}: unsupported scheme {}",
                endpoint,
                parsed.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncApiError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the first batch of remote records mapped to quotes
    pub async fn fetch_quotes(&self) -> Result<Vec<Quote>, SyncApiError> {
        let response = self.client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| SyncApiError::FetchFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let msg = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SyncApiError::FetchFailure(format!("{}: {}", status, msg)));
        }

        let posts: Vec<RemotePost> = response.json().await
            .map_err(|e| SyncApiError::FetchFailure(format!("Invalid response from server: {}", e)))?;

        let fetched_at = Utc::now();
        let quotes: Vec<Quote> = posts
            .into_iter()
            .take(FETCH_BATCH_SIZE)
            .map(|post| post_to_quote(post, fetched_at))
            .collect();

        log::debug!("Fetched {} quotes from {}", quotes.len(), self.endpoint);
        Ok(quotes)
    }

    /// Upload changed quotes
    pub async fn send_updates(
        &self,
        quotes: &[Quote],
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<(), SyncApiError> {
        let mut request = self.client
            .post(&self.endpoint)
            .json(&SyncUpload { quotes, last_sync });

        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncApiError::SendFailure(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            log::debug!("Uploaded {} quotes to {}", quotes.len(), self.endpoint);
            Ok(())
        } else {
            let msg = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            Err(SyncApiError::SendFailure(format!("{}: {}", status, msg)))
        }
    }
}

/// Map an external record; the fetch time stands in for a missing timestamp
fn post_to_quote(post: RemotePost, fetched_at: DateTime<Utc>) -> Quote {
    Quote {
        id: post.id,
        text: post.title,
        category: SERVER_CATEGORY.to_string(),
        last_updated: post.updated_at.unwrap_or(fetched_at),
        source: Some(QuoteSource::Server),
        synced: None,
        last_synced: None,
        resolved: None,
        resolution: None,
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SyncApiError {
    #[error("Server request failed: {0}")]
    FetchFailure(String),

    #[error("Failed to sync with server: {0}")]
    SendFailure(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

// ============================================================================
// Tests
// ============================================================================
