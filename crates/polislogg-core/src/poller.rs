//! Periodic refresh of the local store from the upstream feed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cache::SharedEventStore;
use crate::models::{Event, EventFilters};
use crate::sync::schedule::{run_periodic, SyncHandle};

/// Source of full snapshots of the live feed.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events(&self, filters: &EventFilters) -> Result<Vec<Event>>;
}

pub struct UpstreamPoller {
    source: Arc<dyn EventSource>,
    store: SharedEventStore,
    filters: EventFilters,
    interval: Duration,
}

impl UpstreamPoller {
    pub fn new(
        source: Arc<dyn EventSource>,
        store: SharedEventStore,
        filters: EventFilters,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            filters,
            interval,
        }
    }

    /// Fetch one snapshot and fold it into the store. Returns the snapshot size.
    ///
    /// A failed fetch leaves the store untouched; nothing is archived.
    pub async fn poll_once(&self) -> Result<usize> {
        let events = self.source.fetch_events(&self.filters).await?;
        let count = events.len();
        let mut store = self.store.write().await;
        store.cache_events(events);
        info!(received = count, total = store.len(), "Refreshed from police feed");
        Ok(count)
    }

    /// Poll immediately, then every interval.
    pub fn spawn(self: Arc<Self>) -> SyncHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let interval = self.interval;
        let task = tokio::spawn(run_periodic(
            "upstream-poll",
            Duration::ZERO,
            interval,
            shutdown_rx,
            move || {
                let poller = self.clone();
                async move {
                    if let Err(e) = poller.poll_once().await {
                        warn!(error = %format!("{:#}", e), "Police feed refresh failed");
                    }
                }
            },
        ));
        SyncHandle::new(shutdown_tx, vec![task])
    }
}
