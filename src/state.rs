//! Shared application state handed to every handler.

use crate::services::storage_service::ObjectStore;
use std::{sync::Arc, time::Duration};

/// Per-stage time limits for a resize request.
#[derive(Debug, Clone, Copy)]
pub struct StageTimeouts {
    pub fetch: Duration,
    pub transform: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            fetch: Duration::from_secs(10),
            transform: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    /// Storage client, shared by all in-flight requests.
    pub store: Arc<dyn ObjectStore>,
    pub timeouts: StageTimeouts,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>, timeouts: StageTimeouts) -> Self {
        Self { store, timeouts }
    }
}
