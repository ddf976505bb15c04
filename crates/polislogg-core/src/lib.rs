//! polislogg core library.
//!
//! Caches the Swedish police events feed locally, keeps events that drop
//! out of the feed as archived history, and exchanges that history with
//! other clients through a shared pool.

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod poller;
pub mod pool;
pub mod sync;
pub mod utils;

pub use api::{ApiError, PoliceApiClient, SharedCacheClient};
pub use cache::{EventStore, FileBackend, MemoryBackend, SharedEventStore, StorageBackend, StorageError};
pub use config::Config;
pub use poller::{EventSource, UpstreamPoller};
pub use pool::SharedPool;
pub use sync::{CacheSynchronizer, PullOutcome, PushOutcome, SharedPoolRemote, SyncConfig, SyncHandle};
