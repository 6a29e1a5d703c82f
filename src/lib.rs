pub mod app;
pub mod config;
pub mod error;
pub mod mcp;
pub mod middleware;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub sessions: mcp::SessionRegistry,
    pub engine_factory: Arc<dyn mcp::EngineFactory>,
}

impl AppState {
    /// State with an empty session registry
    pub fn new(engine_factory: Arc<dyn mcp::EngineFactory>) -> Self {
        Self {
            sessions: mcp::SessionRegistry::new(),
            engine_factory,
        }
    }
}
