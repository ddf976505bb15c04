use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::{
    sort_newest_first, CachedEvent, PoolMetadata, ResetResponse, SharedCacheEvent,
    SharedCacheResponse, UploadResponse,
};
use crate::sync::merge::should_accept;

struct PoolState {
    events: HashMap<i64, SharedCacheEvent>,
    contributors: BTreeSet<String>,
    last_update: DateTime<Utc>,
    oldest_event: Option<DateTime<Utc>>,
    newest_event: Option<DateTime<Utc>>,
}

impl PoolState {
    fn empty() -> Self {
        Self {
            events: HashMap::new(),
            contributors: BTreeSet::new(),
            last_update: Utc::now(),
            oldest_event: None,
            newest_event: None,
        }
    }

    fn metadata(&self) -> PoolMetadata {
        PoolMetadata {
            last_update: self.last_update,
            total_events: self.events.len(),
            contributors: self.contributors.iter().cloned().collect(),
            oldest_event: self.oldest_event,
            newest_event: self.newest_event,
        }
    }

    fn refresh_bounds(&mut self) {
        let mut stamps = self.events.values().filter_map(|e| e.cached.timestamp());
        let Some(first) = stamps.next() else {
            self.oldest_event = None;
            self.newest_event = None;
            return;
        };
        let (lo, hi) = stamps.fold((first, first), |(lo, hi), at| (lo.min(at), hi.max(at)));
        self.oldest_event = Some(lo);
        self.newest_event = Some(hi);
    }
}

/// Process-wide aggregate of events uploaded by every client.
///
/// Held only in memory: a restart is an implicit reset. Writes take the
/// lock for the whole batch and plan every change before applying any, so a
/// reader never sees half a batch.
pub struct SharedPool {
    state: RwLock<PoolState>,
}

impl Default for SharedPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedPool {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PoolState::empty()),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Records cached strictly after `since` (all when `None`), newest event first,
    /// plus metadata describing the whole pool.
    pub async fn read(&self, since: Option<DateTime<Utc>>) -> SharedCacheResponse {
        let state = self.state.read().await;
        let mut events: Vec<SharedCacheEvent> = state
            .events
            .values()
            .filter(|e| since.map_or(true, |since| e.cached.cached_at > since))
            .cloned()
            .collect();
        sort_newest_first(&mut events, |e| e.cached.timestamp());

        debug!(since = ?since, returned = events.len(), total = state.events.len(), "Shared cache read");
        SharedCacheResponse {
            events,
            metadata: state.metadata(),
        }
    }

    /// Merge a batch uploaded by `contributor_id`.
    pub async fn write(&self, candidates: Vec<CachedEvent>, contributor_id: &str) -> UploadResponse {
        let mut state = self.state.write().await;

        // Plan against the current pool plus earlier records of this batch
        let mut staged: HashMap<i64, SharedCacheEvent> = HashMap::new();
        let mut new_events: usize = 0;
        let mut updated_events: usize = 0;
        for cached in candidates {
            let id = cached.id();
            let existing = staged.get(&id).or_else(|| state.events.get(&id));
            if !should_accept(existing.map(|e| &e.cached), &cached) {
                continue;
            }
            if existing.is_none() {
                new_events += 1;
            } else {
                updated_events += 1;
            }
            staged.insert(
                id,
                SharedCacheEvent {
                    cached,
                    contributor_id: contributor_id.to_string(),
                },
            );
        }

        // Apply
        state.events.extend(staged);
        state.contributors.insert(contributor_id.to_string());
        state.last_update = Utc::now();
        state.refresh_bounds();

        info!(
            contributor = contributor_id,
            new_events,
            updated_events,
            total = state.events.len(),
            "Shared cache updated"
        );

        UploadResponse {
            success: true,
            new_events,
            updated_events,
            total_events: state.events.len(),
            contributors: state.contributors.len(),
        }
    }

    /// Discard every record and all metadata.
    pub async fn reset(&self) -> ResetResponse {
        let mut state = self.state.write().await;
        let dropped = state.events.len();
        *state = PoolState::empty();
        info!(dropped, "Shared cache cleared");
        ResetResponse {
            success: true,
            message: "Shared cache cleared".to_string(),
        }
    }
}
