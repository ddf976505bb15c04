use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::{
    sort_newest_first, CacheMetadata, CachedEvent, DateBounds, DateRange, Event,
};
use crate::sync::merge::merge_record;

use super::backend::{load_json, save_json, StorageBackend, StorageError};

/// Backend key holding every cached event.
pub const EVENTS_KEY: &str = "police_events_cache";

/// Backend key holding the `CacheMetadata` summary.
pub const METADATA_KEY: &str = "police_events_cache_metadata";

/// Archived events older than this are dropped when persistence fails.
pub const ARCHIVE_RETENTION_DAYS: i64 = 30;

/// An `EventStore` shared between the upstream poller, the synchronizer and readers.
pub type SharedEventStore = Arc<RwLock<EventStore>>;

/// Counts from applying a batch of shared-pool records.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub received: usize,
    pub inserted: usize,
    pub updated: usize,
}

impl MergeSummary {
    pub fn changed(&self) -> usize {
        self.inserted + self.updated
    }
}

/// One client's accumulated view of the police event feed.
///
/// Every upstream snapshot is folded in with `cache_events`: events missing
/// from the snapshot become archived, events present are upserted as live and
/// keep the `cached_at` of their first sighting. The store is persisted after
/// every mutation through its `StorageBackend`.
pub struct EventStore {
    backend: Arc<dyn StorageBackend>,
    events: HashMap<i64, CachedEvent>,
    metadata: Option<CacheMetadata>,
    /// Ids observed or archived locally since the last successful push.
    pending_push: HashSet<i64>,
}

impl EventStore {
    /// Open the store, loading whatever the backend holds.
    /// An unreadable cache is logged and replaced by an empty one.
    pub fn open(backend: Arc<dyn StorageBackend>) -> Self {
        let events = match load_json::<Vec<CachedEvent>>(backend.as_ref(), EVENTS_KEY) {
            Ok(Some(list)) => {
                info!(count = list.len(), "Loaded cached events");
                list.into_iter().map(|e| (e.id(), e)).collect()
            }
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load cached events, starting empty");
                HashMap::new()
            }
        };

        let metadata = match load_json::<CacheMetadata>(backend.as_ref(), METADATA_KEY) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(error = %e, "Failed to load cache metadata");
                None
            }
        };

        Self {
            backend,
            events,
            metadata,
            pending_push: HashSet::new(),
        }
    }

    pub fn into_shared(self) -> SharedEventStore {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    // ===== Mutations =====

    /// Fold in the full current snapshot from the upstream feed.
    pub fn cache_events(&mut self, new_events: Vec<Event>) {
        self.cache_events_at(new_events, Utc::now());
    }

    fn cache_events_at(&mut self, new_events: Vec<Event>, now: DateTime<Utc>) {
        let current_ids: HashSet<i64> = new_events.iter().map(|e| e.id).collect();

        let mut archived: usize = 0;
        for (id, cached) in self.events.iter_mut() {
            if !current_ids.contains(id) && !cached.is_archived {
                cached.is_archived = true;
                self.pending_push.insert(*id);
                archived += 1;
            }
        }

        let mut added: usize = 0;
        for event in new_events {
            let id = event.id;
            let cached_at = match self.events.get(&id) {
                Some(existing) => existing.cached_at,
                None => {
                    added += 1;
                    now
                }
            };
            // A reappearing id is live again, even if it had been archived
            self.events.insert(id, CachedEvent::new(event, cached_at));
            self.pending_push.insert(id);
        }

        debug!(
            received = current_ids.len(),
            added,
            archived,
            total = self.events.len(),
            "Cached upstream snapshot"
        );

        self.persist(now);
        self.refresh_metadata(Some(now));
    }

    /// Upsert records pulled from the shared pool.
    ///
    /// Only records passing the merge rule are applied, and ids absent from
    /// the batch are left alone. Known ids keep their local `cached_at`, and
    /// archive status is never cleared by a merge.
    pub fn merge_shared(&mut self, records: Vec<CachedEvent>) -> MergeSummary {
        let mut summary = MergeSummary {
            received: records.len(),
            ..MergeSummary::default()
        };

        for incoming in records {
            let id = incoming.id();
            let existing = self.events.get(&id);
            let Some(merged) = merge_record(existing, incoming) else {
                continue;
            };
            match existing {
                None => summary.inserted += 1,
                Some(current) if *current != merged => summary.updated += 1,
                Some(_) => continue,
            }
            self.events.insert(id, merged);
        }

        if summary.changed() > 0 {
            debug!(
                received = summary.received,
                inserted = summary.inserted,
                updated = summary.updated,
                "Merged shared records"
            );
            self.persist(Utc::now());
            // Counts and bounds change, the upstream fetch time does not
            let last_fetch = self.metadata.as_ref().and_then(|m| m.last_fetch);
            self.refresh_metadata(last_fetch);
        }
        summary
    }

    /// Wipe the store and its persisted documents.
    pub fn clear_cache(&mut self) -> Result<(), StorageError> {
        self.events.clear();
        self.metadata = None;
        self.pending_push.clear();
        self.backend.remove(EVENTS_KEY)?;
        self.backend.remove(METADATA_KEY)?;
        info!("Event cache cleared");
        Ok(())
    }

    // ===== Queries =====

    /// All records, optionally limited to a date range, newest first.
    pub fn events(&self, range: Option<&DateRange>) -> Vec<CachedEvent> {
        self.collect(|_| true, range)
    }

    /// Records still present in the live feed, newest first.
    pub fn current_events(&self) -> Vec<CachedEvent> {
        self.collect(|e| !e.is_archived, None)
    }

    /// Records that dropped out of the live feed, newest first.
    pub fn archived_events(&self, range: Option<&DateRange>) -> Vec<CachedEvent> {
        self.collect(|e| e.is_archived, range)
    }

    pub fn event_by_id(&self, id: i64) -> Option<&CachedEvent> {
        self.events.get(&id)
    }

    /// First and last event day across the store, `None` when empty.
    pub fn date_range(&self) -> Option<DateBounds> {
        let (oldest, newest) = self.timestamp_bounds()?;
        Some(DateBounds {
            earliest: oldest.date_naive(),
            latest: newest.date_naive(),
        })
    }

    pub fn cache_metadata(&self) -> Option<&CacheMetadata> {
        self.metadata.as_ref()
    }

    /// Records observed or archived locally since the last successful push.
    pub fn pending_push(&self) -> Vec<CachedEvent> {
        self.pending_push
            .iter()
            .filter_map(|id| self.events.get(id).cloned())
            .collect()
    }

    /// Clear the pending flag of each uploaded record, unless the store
    /// changed it after the upload started.
    pub fn mark_pushed(&mut self, sent: &[CachedEvent]) {
        for record in sent {
            let id = record.id();
            if self.events.get(&id) == Some(record) {
                self.pending_push.remove(&id);
            }
        }
    }

    fn collect(
        &self,
        keep: impl Fn(&CachedEvent) -> bool,
        range: Option<&DateRange>,
    ) -> Vec<CachedEvent> {
        let mut events: Vec<CachedEvent> = self
            .events
            .values()
            .filter(|e| keep(e))
            .filter(|e| match range {
                Some(range) => e.timestamp().is_some_and(|at| range.contains(at)),
                None => true,
            })
            .cloned()
            .collect();
        sort_newest_first(&mut events, CachedEvent::timestamp);
        events
    }

    fn timestamp_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut stamps = self.events.values().filter_map(CachedEvent::timestamp);
        let first = stamps.next()?;
        Some(stamps.fold((first, first), |(lo, hi), at| (lo.min(at), hi.max(at))))
    }

    // ===== Persistence =====

    fn write_events(&self) -> Result<(), StorageError> {
        let mut events: Vec<&CachedEvent> = self.events.values().collect();
        events.sort_by_key(|e| e.id());
        save_json(self.backend.as_ref(), EVENTS_KEY, &events)
    }

    /// Persist, falling back to evicting old archived history once.
    fn persist(&mut self, now: DateTime<Utc>) {
        let Err(e) = self.write_events() else {
            return;
        };

        warn!(error = %e, "Failed to persist event cache, evicting old archived events");
        let cutoff = now - Duration::days(ARCHIVE_RETENTION_DAYS);
        let evicted = self.evict_archived_before(cutoff);
        info!(evicted, kept = self.events.len(), "Cleaned up event cache");

        if let Err(e) = self.write_events() {
            warn!(error = %e, "Event cache still not persisted after eviction");
        }
    }

    /// Drop archived records whose event happened before `cutoff`.
    /// Archived records without a readable datetime are dropped too.
    fn evict_archived_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.events.len();
        self.events.retain(|_, e| {
            !e.is_archived || e.timestamp().is_some_and(|at| at >= cutoff)
        });
        let live: HashSet<i64> = self.events.keys().copied().collect();
        self.pending_push.retain(|id| live.contains(id));
        before - self.events.len()
    }

    fn refresh_metadata(&mut self, last_fetch: Option<DateTime<Utc>>) {
        let bounds = self.timestamp_bounds();
        let metadata = CacheMetadata {
            last_fetch,
            total_events: self.events.len(),
            oldest_event: bounds.map(|(lo, _)| lo),
            newest_event: bounds.map(|(_, hi)| hi),
        };
        if let Err(e) = save_json(self.backend.as_ref(), METADATA_KEY, &metadata) {
            warn!(error = %e, "Failed to persist cache metadata");
        }
        self.metadata = Some(metadata);
    }
}
