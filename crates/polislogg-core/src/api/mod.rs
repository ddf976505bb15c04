//! HTTP clients.
//!
//! - `PoliceApiClient`: the upstream polisen.se events feed
//! - `SharedCacheClient`: a remote shared pool, as a `SharedPoolRemote`
//!
//! Requests time out after 30 seconds. Failures carry an `ApiError`.

pub mod client;
pub mod error;
pub mod shared;

pub use client::PoliceApiClient;
pub use error::ApiError;
pub use shared::SharedCacheClient;
