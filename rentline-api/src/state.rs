use rentline_order::BookingOrchestrator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BookingOrchestrator>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(orchestrator: Arc<BookingOrchestrator>, auth: AuthConfig) -> Self {
        Self { orchestrator, auth }
    }
}
