//! Data models for police events and the shared cache wire format.
//!
//! - `Event`, `Location`: incidents as reported by the upstream feed
//! - `CachedEvent`: an event plus when this client first saw it and whether
//!   it has dropped out of the live feed
//! - `SharedCacheEvent` and the request/response types of the shared pool
//! - Query helpers: `DateRange`, `DateBounds`, `CacheMetadata`, `EventFilters`

pub mod event;
pub mod shared;

pub use event::{
    parse_event_time, sort_newest_first, CacheMetadata, CachedEvent, DateBounds, DateRange,
    Event, EventFilters, Location,
};
pub use shared::{
    PoolMetadata, ResetResponse, SharedCacheEvent, SharedCacheResponse, UploadRequest,
    UploadResponse,
};
