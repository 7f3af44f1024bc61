use crate::agents::factory::AgentFactory;
use crate::agents::manager::AgentManager;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub agents: AgentManager,
    pub factory: AgentFactory,
}
