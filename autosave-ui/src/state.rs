//! Shared application state for the UI server.

use std::sync::Arc;

use autosave::orchestrator::DynAutosave;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The autosave service; owns the store and the scheduler.
    pub autosave: Arc<DynAutosave>,
}

impl AppState {
    pub fn new(autosave: DynAutosave) -> Self {
        Self {
            autosave: Arc::new(autosave),
        }
    }
}
