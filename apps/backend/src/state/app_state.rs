use std::sync::Arc;

use crate::services::game_flow::GameFlowService;
use crate::ws::hub::SessionRegistry;
use crate::ws::router::ActionRouter;

/// Application state shared by every worker.
#[derive(Clone)]
pub struct AppState {
    /// Entry point for connection actions
    pub router: Arc<ActionRouter>,
    /// Room lifecycle service (exposed for read paths and tests)
    pub flow: Arc<GameFlowService>,
    /// Sessions attached to this process
    pub registry: Arc<SessionRegistry>,
    pub instance_id: String,
}

impl AppState {
    pub fn new(
        router: Arc<ActionRouter>,
        flow: Arc<GameFlowService>,
        registry: Arc<SessionRegistry>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            router,
            flow,
            registry,
            instance_id: instance_id.into(),
        }
    }
}
