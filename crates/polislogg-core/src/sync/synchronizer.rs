//! Background exchange between the local event store and the shared pool.
//!
//! Pull and push run on independent timers. Each path is guarded by its own
//! busy flag: a cycle requested while another of the same kind is running is
//! dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::backend::{load_json, save_json, StorageBackend};
use crate::cache::store::{MergeSummary, SharedEventStore};
use crate::models::{CachedEvent, PoolMetadata, ResetResponse, SharedCacheResponse, UploadResponse};

use super::schedule::{run_periodic, SyncHandle};

/// Backend key for the watermark of the last successful pull.
pub const LAST_SYNC_KEY: &str = "last_shared_sync";

/// Backend key for the advisory "a pull is happening" timestamp.
pub const COORDINATION_KEY: &str = "shared_cache_coordination";

/// The shared pool as seen by a client.
#[async_trait]
pub trait SharedPoolRemote: Send + Sync {
    /// Records cached strictly after `since`, or the whole pool.
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<SharedCacheResponse>;
    async fn upload(&self, events: &[CachedEvent]) -> Result<UploadResponse>;
    async fn reset(&self) -> Result<ResetResponse>;
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub pull_interval: Duration,
    pub push_interval: Duration,
    /// Delay before the first pull after `spawn`.
    pub startup_delay: Duration,
    /// A pull within this window of the previous one is skipped.
    pub coordination_window: Duration,
    /// Upload only records changed since the last successful push.
    pub incremental_push: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pull_interval: Duration::from_secs(5 * 60),
            push_interval: Duration::from_secs(10 * 60),
            startup_delay: Duration::from_secs(2),
            coordination_window: Duration::from_secs(2 * 60),
            incremental_push: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Another pull was already running.
    Busy,
    /// A pull happened inside the coordination window.
    Skipped,
    Merged(MergeSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Another push was already running.
    Busy,
    /// Nothing to upload.
    Empty,
    Uploaded(UploadResponse),
}

#[derive(Debug, Serialize, Deserialize)]
struct Coordination {
    #[serde(rename = "lastSync")]
    last_sync: i64,
}

/// Clears the flag when dropped, including on early return or error.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CacheSynchronizer {
    store: SharedEventStore,
    backend: Arc<dyn StorageBackend>,
    remote: Arc<dyn SharedPoolRemote>,
    config: SyncConfig,
    pulling: AtomicBool,
    pushing: AtomicBool,
}

impl CacheSynchronizer {
    /// `backend` holds the watermark and coordination keys; normally the
    /// same backend the store persists to.
    pub fn new(
        store: SharedEventStore,
        backend: Arc<dyn StorageBackend>,
        remote: Arc<dyn SharedPoolRemote>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            backend,
            remote,
            config,
            pulling: AtomicBool::new(false),
            pushing: AtomicBool::new(false),
        }
    }

    // ===== Pull =====

    pub async fn pull(&self) -> Result<PullOutcome> {
        let Some(_guard) = BusyGuard::acquire(&self.pulling) else {
            debug!("Pull already in progress");
            return Ok(PullOutcome::Busy);
        };

        let now = Utc::now();
        if let Some(last) = self.last_coordination() {
            let elapsed = now.signed_duration_since(last);
            if elapsed.to_std().is_ok_and(|e| e < self.config.coordination_window) {
                debug!(seconds_ago = elapsed.num_seconds(), "Recent pull, skipping");
                return Ok(PullOutcome::Skipped);
            }
        }
        self.write_coordination(now);

        let since = self.watermark();
        let response = self
            .remote
            .fetch(since)
            .await
            .context("Failed to fetch shared cache")?;

        let records = response.events.into_iter().map(|e| e.cached).collect();
        let summary = self.store.write().await.merge_shared(records);

        if let Err(e) = save_json(self.backend.as_ref(), LAST_SYNC_KEY, &now) {
            warn!(error = %e, "Failed to save sync watermark");
        }

        info!(
            since = ?since,
            received = summary.received,
            inserted = summary.inserted,
            updated = summary.updated,
            pool_total = response.metadata.total_events,
            "Pulled shared cache"
        );
        Ok(PullOutcome::Merged(summary))
    }

    /// Forget the watermark and pull the whole pool.
    pub async fn force_pull(&self) -> Result<PullOutcome> {
        self.backend
            .remove(LAST_SYNC_KEY)
            .context("Failed to clear sync watermark")?;
        info!("Sync watermark cleared");
        self.pull().await
    }

    /// Watermark of the last successful pull.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        match load_json::<DateTime<Utc>>(self.backend.as_ref(), LAST_SYNC_KEY) {
            Ok(watermark) => watermark,
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable sync watermark");
                None
            }
        }
    }

    fn last_coordination(&self) -> Option<DateTime<Utc>> {
        match load_json::<Coordination>(self.backend.as_ref(), COORDINATION_KEY) {
            Ok(Some(c)) => Utc.timestamp_millis_opt(c.last_sync).single(),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable coordination record");
                None
            }
        }
    }

    fn write_coordination(&self, now: DateTime<Utc>) {
        let record = Coordination {
            last_sync: now.timestamp_millis(),
        };
        if let Err(e) = save_json(self.backend.as_ref(), COORDINATION_KEY, &record) {
            warn!(error = %e, "Failed to write coordination record");
        }
    }

    // ===== Push =====

    pub async fn push(&self) -> Result<PushOutcome> {
        let Some(_guard) = BusyGuard::acquire(&self.pushing) else {
            debug!("Push already in progress");
            return Ok(PushOutcome::Busy);
        };

        let records = {
            let store = self.store.read().await;
            if self.config.incremental_push {
                store.pending_push()
            } else {
                store.events(None)
            }
        };
        if records.is_empty() {
            debug!("Nothing to push");
            return Ok(PushOutcome::Empty);
        }

        let response = self
            .remote
            .upload(&records)
            .await
            .context("Failed to upload to shared cache")?;

        // Records changed during the upload stay pending for the next cycle
        self.store.write().await.mark_pushed(&records);

        info!(
            sent = records.len(),
            new_events = response.new_events,
            updated_events = response.updated_events,
            pool_total = response.total_events,
            contributors = response.contributors,
            "Pushed to shared cache"
        );
        Ok(PushOutcome::Uploaded(response))
    }

    // ===== Pool administration =====

    pub async fn shared_stats(&self) -> Result<PoolMetadata> {
        // Nothing is cached after now, so this returns metadata only
        let response = self
            .remote
            .fetch(Some(Utc::now()))
            .await
            .context("Failed to fetch shared cache stats")?;
        Ok(response.metadata)
    }

    pub async fn reset_shared(&self) -> Result<ResetResponse> {
        self.remote
            .reset()
            .await
            .context("Failed to reset shared cache")
    }

    // ===== Scheduling =====

    /// Start the pull and push loops.
    pub fn spawn(self: Arc<Self>) -> SyncHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let puller = self.clone();
        let pull_task = tokio::spawn(run_periodic(
            "shared-pull",
            self.config.startup_delay,
            self.config.pull_interval,
            shutdown_rx.clone(),
            move || {
                let sync = puller.clone();
                async move {
                    if let Err(e) = sync.pull().await {
                        warn!(error = %format!("{:#}", e), "Shared cache pull failed");
                    }
                }
            },
        ));

        let pusher = self.clone();
        let push_task = tokio::spawn(run_periodic(
            "shared-push",
            self.config.push_interval,
            self.config.push_interval,
            shutdown_rx,
            move || {
                let sync = pusher.clone();
                async move {
                    if let Err(e) = sync.push().await {
                        warn!(error = %format!("{:#}", e), "Shared cache push failed");
                    }
                }
            },
        ));

        info!(
            pull_secs = self.config.pull_interval.as_secs(),
            push_secs = self.config.push_interval.as_secs(),
            "Shared cache sync started"
        );
        SyncHandle::new(shutdown_tx, vec![pull_task, push_task])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::backend::MemoryBackend;
    use crate::cache::store::EventStore;
    use crate::models::event::sample_event;
    use crate::pool::SharedPool;

    /// Talks to a `SharedPool` in the same process.
    pub(crate) struct InProcessRemote {
        pub pool: Arc<SharedPool>,
        pub contributor: String,
    }

    #[async_trait]
    impl SharedPoolRemote for InProcessRemote {
        async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<SharedCacheResponse> {
            Ok(self.pool.read(since).await)
        }

        async fn upload(&self, events: &[CachedEvent]) -> Result<UploadResponse> {
            Ok(self.pool.write(events.to_vec(), &self.contributor).await)
        }

        async fn reset(&self) -> Result<ResetResponse> {
            Ok(self.pool.reset().await)
        }
    }

    struct FailingRemote;

    #[async_trait]
    impl SharedPoolRemote for FailingRemote {
        async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<SharedCacheResponse> {
            anyhow::bail!("connection refused")
        }

        async fn upload(&self, _events: &[CachedEvent]) -> Result<UploadResponse> {
            anyhow::bail!("connection refused")
        }

        async fn reset(&self) -> Result<ResetResponse> {
            anyhow::bail!("connection refused")
        }
    }

    /// Archives event 1 in the client's store while the first upload is in flight.
    struct ArchivingRemote {
        inner: InProcessRemote,
        store: SharedEventStore,
        fired: AtomicBool,
    }

    #[async_trait]
    impl SharedPoolRemote for ArchivingRemote {
        async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<SharedCacheResponse> {
            self.inner.fetch(since).await
        }

        async fn upload(&self, events: &[CachedEvent]) -> Result<UploadResponse> {
            let response = self.inner.upload(events).await?;
            if !self.fired.swap(true, Ordering::SeqCst) {
                self.store
                    .write()
                    .await
                    .cache_events(vec![sample_event(2, "2024-06-02T10:00:00Z")]);
            }
            Ok(response)
        }

        async fn reset(&self) -> Result<ResetResponse> {
            self.inner.reset().await
        }
    }

    struct Client {
        store: SharedEventStore,
        sync: CacheSynchronizer,
    }

    fn client(remote: Arc<dyn SharedPoolRemote>, config: SyncConfig) -> Client {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let store = EventStore::open(backend.clone()).into_shared();
        let sync = CacheSynchronizer::new(store.clone(), backend, remote, config);
        Client { store, sync }
    }

    fn pool_client(pool: &Arc<SharedPool>, name: &str, config: SyncConfig) -> Client {
        let remote = Arc::new(InProcessRemote {
            pool: pool.clone(),
            contributor: name.to_string(),
        });
        client(remote, config)
    }

    fn no_window() -> SyncConfig {
        SyncConfig {
            coordination_window: Duration::ZERO,
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn test_push_then_pull_between_clients() {
        let pool = Arc::new(SharedPool::new());
        let a = pool_client(&pool, "a", no_window());
        let b = pool_client(&pool, "b", no_window());

        a.store.write().await.cache_events(vec![
            sample_event(1, "2024-06-01T10:00:00Z"),
            sample_event(2, "2024-06-02T10:00:00Z"),
        ]);
        let PushOutcome::Uploaded(upload) = a.sync.push().await.unwrap() else {
            panic!("expected upload");
        };
        assert_eq!(upload.new_events, 2);

        let PullOutcome::Merged(summary) = b.sync.pull().await.unwrap() else {
            panic!("expected merge");
        };
        assert_eq!(summary.inserted, 2);

        let a_store = a.store.read().await;
        let b_store = b.store.read().await;
        assert_eq!(b_store.len(), 2);
        assert_eq!(
            b_store.event_by_id(1).map(|e| e.cached_at),
            a_store.event_by_id(1).map(|e| e.cached_at)
        );
    }

    #[tokio::test]
    async fn test_watermark_limits_second_pull_and_force_pull_resets_it() {
        let pool = Arc::new(SharedPool::new());
        let a = pool_client(&pool, "a", no_window());
        let b = pool_client(&pool, "b", no_window());

        a.store
            .write()
            .await
            .cache_events(vec![sample_event(1, "2024-06-01T10:00:00Z")]);
        a.sync.push().await.unwrap();

        assert!(b.sync.watermark().is_none());
        b.sync.pull().await.unwrap();
        assert!(b.sync.watermark().is_some());

        let second = b.sync.pull().await.unwrap();
        assert_eq!(
            second,
            PullOutcome::Merged(MergeSummary::default()),
            "records cached before the watermark are not resent"
        );

        let PullOutcome::Merged(forced) = b.sync.force_pull().await.unwrap() else {
            panic!("expected merge");
        };
        assert_eq!(forced.received, 1);
        assert_eq!(forced.changed(), 0);
    }

    #[tokio::test]
    async fn test_pull_inside_coordination_window_is_skipped() {
        let pool = Arc::new(SharedPool::new());
        let b = pool_client(&pool, "b", SyncConfig::default());

        assert!(matches!(b.sync.pull().await.unwrap(), PullOutcome::Merged(_)));
        assert_eq!(b.sync.pull().await.unwrap(), PullOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_failed_pull_keeps_watermark_and_releases_guard() {
        let c = client(Arc::new(FailingRemote), no_window());
        assert!(c.sync.pull().await.is_err());
        assert!(c.sync.watermark().is_none());
        // The busy flag was released by the failed attempt
        assert!(c.sync.pull().await.is_err());
    }

    #[tokio::test]
    async fn test_push_empty_store() {
        let pool = Arc::new(SharedPool::new());
        let a = pool_client(&pool, "a", no_window());
        assert_eq!(a.sync.push().await.unwrap(), PushOutcome::Empty);
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_incremental_push_sends_only_changes() {
        let pool = Arc::new(SharedPool::new());
        let config = SyncConfig {
            incremental_push: true,
            ..no_window()
        };
        let a = pool_client(&pool, "a", config);

        a.store
            .write()
            .await
            .cache_events(vec![sample_event(1, "2024-06-01T10:00:00Z")]);
        assert!(matches!(a.sync.push().await.unwrap(), PushOutcome::Uploaded(_)));
        assert_eq!(a.sync.push().await.unwrap(), PushOutcome::Empty);

        // Event 1 drops out of the feed and is archived
        a.store
            .write()
            .await
            .cache_events(vec![sample_event(2, "2024-06-02T10:00:00Z")]);
        let PushOutcome::Uploaded(upload) = a.sync.push().await.unwrap() else {
            panic!("expected upload");
        };
        assert_eq!(upload.new_events, 1);
        assert_eq!(upload.updated_events, 1);

        let pooled = pool.read(None).await;
        let archived = pooled.events.iter().find(|e| e.id() == 1).expect("event 1");
        assert!(archived.cached.is_archived);
    }

    #[tokio::test]
    async fn test_archive_during_upload_is_pushed_next_cycle() {
        let pool = Arc::new(SharedPool::new());
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let store = EventStore::open(backend.clone()).into_shared();
        store.write().await.cache_events(vec![
            sample_event(1, "2024-06-01T10:00:00Z"),
            sample_event(2, "2024-06-02T10:00:00Z"),
        ]);
        let remote = Arc::new(ArchivingRemote {
            inner: InProcessRemote {
                pool: pool.clone(),
                contributor: "a".to_string(),
            },
            store: store.clone(),
            fired: AtomicBool::new(false),
        });
        let config = SyncConfig {
            incremental_push: true,
            ..no_window()
        };
        let sync = CacheSynchronizer::new(store.clone(), backend, remote, config);

        let PushOutcome::Uploaded(first) = sync.push().await.unwrap() else {
            panic!("expected upload");
        };
        assert_eq!(first.new_events, 2);

        let pending = store.read().await.pending_push();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), 1);
        assert!(pending[0].is_archived);

        let PushOutcome::Uploaded(second) = sync.push().await.unwrap() else {
            panic!("expected upload");
        };
        assert_eq!(second.updated_events, 1);
        assert_eq!(sync.push().await.unwrap(), PushOutcome::Empty);

        let pooled = pool.read(None).await;
        let archived = pooled.events.iter().find(|e| e.id() == 1).expect("event 1");
        assert!(archived.cached.is_archived);
    }

    #[tokio::test]
    async fn test_pull_refreshes_local_metadata() {
        let pool = Arc::new(SharedPool::new());
        let a = pool_client(&pool, "a", no_window());
        let b = pool_client(&pool, "b", no_window());

        a.store.write().await.cache_events(vec![
            sample_event(1, "2024-06-01T10:00:00Z"),
            sample_event(2, "2024-06-02T10:00:00Z"),
        ]);
        a.sync.push().await.unwrap();
        b.store
            .write()
            .await
            .cache_events(vec![sample_event(3, "2024-06-03T10:00:00Z")]);
        b.sync.pull().await.unwrap();

        let store = b.store.read().await;
        let metadata = store.cache_metadata().expect("metadata");
        assert_eq!(metadata.total_events, store.len());
        assert_eq!(store.len(), 3);
        assert_eq!(
            metadata.oldest_event.map(|at| at.date_naive()),
            store.date_range().map(|bounds| bounds.earliest)
        );
    }

    #[tokio::test]
    async fn test_busy_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = BusyGuard::acquire(&flag).expect("free");
        assert!(BusyGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(BusyGuard::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_shared_stats_and_reset() {
        let pool = Arc::new(SharedPool::new());
        let a = pool_client(&pool, "a", no_window());
        a.store
            .write()
            .await
            .cache_events(vec![sample_event(1, "2024-06-01T10:00:00Z")]);
        a.sync.push().await.unwrap();

        let stats = a.sync.shared_stats().await.unwrap();
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.contributors, vec!["a".to_string()]);

        assert!(a.sync.reset_shared().await.unwrap().success);
        assert_eq!(a.sync.shared_stats().await.unwrap().total_events, 0);
    }
}
