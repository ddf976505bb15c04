//! Client for the public polisen.se events feed.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, warn};

use crate::config::DEFAULT_API_URL;
use crate::models::{Event, EventFilters};
use crate::poller::EventSource;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Retries after the first failed attempt.
const MAX_RETRIES: u32 = 3;

/// Backoff before the first retry; doubled for every further retry.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound for a single backoff delay.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Backoff before retry number `attempt` (0-based).
fn retry_delay(initial_ms: u64, attempt: u32) -> Duration {
    let ms = initial_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}

pub(crate) fn http_client() -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()?;
    Ok(client)
}

/// Check if response is successful, returning an error with body if not.
pub(crate) async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

/// Keep events matching `query` in name, summary, location or type.
pub fn filter_by_query(events: Vec<Event>, query: Option<&str>) -> Vec<Event> {
    match query.filter(|q| !q.is_empty()) {
        Some(query) => events.into_iter().filter(|e| e.matches_query(query)).collect(),
        None => events,
    }
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct PoliceApiClient {
    client: Client,
    base_url: String,
    initial_backoff_ms: u64,
}

impl PoliceApiClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_API_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into(),
            initial_backoff_ms: INITIAL_BACKOFF_MS,
        })
    }

    /// Current snapshot of the feed, narrowed by `filters`.
    pub async fn fetch_events(&self, filters: &EventFilters) -> Result<Vec<Event>> {
        let params = filters.query_params();
        let mut attempt = 0;

        let events = loop {
            match self.fetch_once(&params).await {
                Ok(events) => break events,
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    let delay = retry_delay(self.initial_backoff_ms, attempt);
                    attempt += 1;
                    warn!(
                        url = %self.base_url,
                        retry = attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "Police API request failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(ApiError::FetchFailed {
                        attempts: attempt + 1,
                        last: e.to_string(),
                    }
                    .into())
                }
            }
        };

        let fetched = events.len();
        let events = filter_by_query(events, filters.search_query.as_deref());
        debug!(fetched, kept = events.len(), "Fetched police events");
        Ok(events)
    }

    async fn fetch_once(&self, params: &[(&'static str, String)]) -> Result<Vec<Event>, ApiError> {
        let response = self
            .client
            .get(&self.base_url)
            .header(header::ACCEPT, "application/json")
            .query(params)
            .send()
            .await?;
        let response = check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl EventSource for PoliceApiClient {
    async fn fetch_events(&self, filters: &EventFilters) -> Result<Vec<Event>> {
        PoliceApiClient::fetch_events(self, filters)
            .await
            .context("Failed to fetch police events")
    }
}
