//! Wire types for the shared cache endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

use super::CachedEvent;

/// A cached event as held by the shared pool, tagged with its uploader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct SharedCacheEvent {
    #[serde(flatten)]
    pub cached: CachedEvent,
    #[serde(rename = "contributorId")]
    pub contributor_id: String,
}

impl SharedCacheEvent {
    pub fn id(&self) -> i64 {
        self.cached.event.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct PoolMetadata {
    pub last_update: DateTime<Utc>,
    pub total_events: usize,
    pub contributors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_event: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest_event: Option<DateTime<Utc>>,
}

/// `GET /shared-cache` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct SharedCacheResponse {
    pub events: Vec<SharedCacheEvent>,
    pub metadata: PoolMetadata,
}

/// `POST /shared-cache` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct UploadRequest {
    pub events: Vec<CachedEvent>,
}

/// `POST /shared-cache` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct UploadResponse {
    pub success: bool,
    pub new_events: usize,
    pub updated_events: usize,
    pub total_events: usize,
    pub contributors: usize,
}

/// `DELETE /shared-cache` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
}
