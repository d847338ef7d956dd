//! Application state shared across connection handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::handlers::EventRouter;
use crate::hub::Hub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub router: Arc<EventRouter>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            hub: Hub::new(config.monitor_interval),
            router: Arc::new(EventRouter::new()),
        }
    }
}
