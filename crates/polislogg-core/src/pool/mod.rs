//! Server-side shared pool that aggregates events from every client.

pub mod contributor;
pub mod shared;

pub use contributor::{client_address, contributor_id};
pub use shared::SharedPool;
