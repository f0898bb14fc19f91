//! Application State

use std::sync::Arc;

use agent_core::Orchestrator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// One orchestrator per process; queries are serialized inside it
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}
