pub mod clear;
pub mod events;
pub mod fetch;
pub mod run;
pub mod stats;
pub mod sync;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::NaiveDate;

use polislogg_core::models::{CachedEvent, DateRange};
use polislogg_core::{
    CacheSynchronizer, Config, EventStore, FileBackend, PoliceApiClient, SharedCacheClient,
    SharedEventStore, StorageBackend,
};

/// Everything a command needs: configuration and the opened local store.
pub struct Context {
    pub config: Config,
    pub backend: Arc<dyn StorageBackend>,
    pub store: SharedEventStore,
}

impl Context {
    pub fn open(config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let backend = FileBackend::new(cache_dir.clone())
            .with_context(|| format!("Failed to open cache directory {}", cache_dir.display()))?
            .with_quota(config.storage_quota_bytes);
        let backend: Arc<dyn StorageBackend> = Arc::new(backend);
        let store = EventStore::open(backend.clone()).into_shared();
        Ok(Self {
            config,
            backend,
            store,
        })
    }

    pub fn police_client(&self) -> Result<PoliceApiClient> {
        PoliceApiClient::with_base_url(self.config.api_url.clone())
    }

    pub fn synchronizer(&self) -> Result<CacheSynchronizer> {
        let remote = SharedCacheClient::new(self.config.shared_cache_url.clone())?;
        Ok(CacheSynchronizer::new(
            self.store.clone(),
            self.backend.clone(),
            Arc::new(remote),
            self.config.sync_config(),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    All,
    Current,
    Archived,
}

/// Which cached events `polislogg events` lists.
#[derive(Debug, Clone)]
pub struct EventsQuery {
    pub range: Option<DateRange>,
    pub status: Status,
    pub limit: Option<usize>,
}

impl EventsQuery {
    /// An open end of the range extends to the earliest/latest representable day.
    pub fn new(
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        status: Status,
        limit: Option<usize>,
    ) -> Result<Self> {
        let range = match (from, to) {
            (None, None) => None,
            (Some(from), Some(to)) if from > to => {
                anyhow::bail!("--from {} is after --to {}", from, to)
            }
            (from, to) => Some(DateRange::new(
                from.unwrap_or(NaiveDate::MIN),
                to.unwrap_or(NaiveDate::MAX),
            )),
        };
        Ok(Self {
            range,
            status,
            limit,
        })
    }

    pub fn select(&self, store: &EventStore) -> Vec<CachedEvent> {
        let range = self.range.as_ref();
        let mut events = match self.status {
            Status::All => store.events(range),
            Status::Archived => store.archived_events(range),
            Status::Current => store
                .current_events()
                .into_iter()
                .filter(|e| match range {
                    Some(range) => e.timestamp().is_some_and(|at| range.contains(at)),
                    None => true,
                })
                .collect(),
        };
        if let Some(limit) = self.limit {
            events.truncate(limit);
        }
        events
    }
}
