//! HTTP client for a remote shared pool endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::models::{CachedEvent, ResetResponse, SharedCacheResponse, UploadResponse};
use crate::sync::SharedPoolRemote;

use super::client::{check_response, http_client};

#[derive(Serialize)]
struct UploadBody<'a> {
    events: &'a [CachedEvent],
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SharedCacheClient {
    client: Client,
    url: String,
}

impl SharedCacheClient {
    /// `url` is the full endpoint, e.g. `http://host:3000/shared-cache`.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SharedPoolRemote for SharedCacheClient {
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<SharedCacheResponse> {
        let mut request = self.client.get(&self.url);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Millis, true))]);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send GET request to {}", self.url))?;
        let response = check_response(response).await?;
        let body: SharedCacheResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", self.url))?;
        debug!(returned = body.events.len(), total = body.metadata.total_events, "Fetched shared cache");
        Ok(body)
    }

    async fn upload(&self, events: &[CachedEvent]) -> Result<UploadResponse> {
        let response = self
            .client
            .post(&self.url)
            .json(&UploadBody { events })
            .send()
            .await
            .with_context(|| format!("Failed to send POST request to {}", self.url))?;
        let response = check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", self.url))
    }

    async fn reset(&self) -> Result<ResetResponse> {
        let response = self
            .client
            .delete(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to send DELETE request to {}", self.url))?;
        let response = check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", self.url))
    }
}
