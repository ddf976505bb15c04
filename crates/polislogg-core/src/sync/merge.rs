//! Conflict rule shared by the client merge path and the shared pool.

use crate::models::CachedEvent;

/// Whether `incoming` should replace `existing`.
///
/// Accepted when there is no existing record, when the incoming `cached_at`
/// is strictly newer, or when the incoming record promotes a live record to
/// archived (regardless of timestamps).
pub fn should_accept(existing: Option<&CachedEvent>, incoming: &CachedEvent) -> bool {
    match existing {
        None => true,
        Some(existing) => {
            incoming.cached_at > existing.cached_at
                || (!existing.is_archived && incoming.is_archived)
        }
    }
}

/// Resolve an incoming shared record against the local one.
///
/// Returns `None` when the rule rejects the record. For a known id the local
/// `cached_at` is kept, content comes from whichever side is newer, and the
/// archive flags are OR-ed so a merge never un-archives.
pub fn merge_record(existing: Option<&CachedEvent>, incoming: CachedEvent) -> Option<CachedEvent> {
    if !should_accept(existing, &incoming) {
        return None;
    }
    let Some(existing) = existing else {
        return Some(incoming);
    };

    let is_archived = existing.is_archived || incoming.is_archived;
    let event = if incoming.cached_at > existing.cached_at {
        incoming.event
    } else {
        existing.event.clone()
    };
    Some(CachedEvent {
        event,
        cached_at: existing.cached_at,
        is_archived,
    })
}
