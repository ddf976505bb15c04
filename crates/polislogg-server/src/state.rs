use std::sync::Arc;

use polislogg_core::SharedPool;

/// Shared application state
#[derive(Clone, Default)]
pub struct AppState {
    pub pool: Arc<SharedPool>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}
