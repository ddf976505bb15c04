//! Exchange of cached events between a client and the shared pool.
//!
//! - `merge`: the conflict rule both sides apply to incoming records
//! - `synchronizer`: timed pull/push cycles against a `SharedPoolRemote`
//! - `schedule`: the periodic loop and its shutdown handle

pub mod merge;
pub mod schedule;
pub mod synchronizer;

pub use merge::{merge_record, should_accept};
pub use schedule::{SyncHandle, MIN_PERIOD};
pub use synchronizer::{
    CacheSynchronizer, PullOutcome, PushOutcome, SharedPoolRemote, SyncConfig, COORDINATION_KEY,
    LAST_SYNC_KEY,
};
