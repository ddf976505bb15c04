//! Local event cache.
//!
//! `EventStore` holds one client's accumulated view of the feed and persists
//! it through a `StorageBackend` as plain JSON documents.

pub mod backend;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, StorageBackend, StorageError};
pub use store::{EventStore, MergeSummary, SharedEventStore};
