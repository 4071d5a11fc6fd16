//! Shared application state
//!
//! Built once at startup and cloned into every handler. Nothing in it is
//! mutable, so no locking is needed.

use crate::config::Config;
use crate::services::UploadStore;
use std::sync::Arc;

/// State handed to every request handler
#[derive(Clone)]
pub struct AppState {
    /// Process-wide configuration
    pub config: Arc<Config>,
    /// Storage for uploaded files
    pub store: UploadStore,
}

impl AppState {
    /// Create state from a finished configuration
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        Self {
            store: UploadStore::new(config.clone()),
            config,
        }
    }
}
