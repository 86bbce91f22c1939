//! Shared application state.

use crate::config::ConfigV1;
use crate::session::SessionSynchronizer;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    /// Handle to the session worker; clones share one worker.
    pub session: SessionSynchronizer,
}
