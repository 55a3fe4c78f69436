use moka::sync::Cache;

use crate::config::Config;
use crate::realtime::RealtimeHub;
use crate::websocket::connctx::ConnCtx;

/// Shared state handed to every route
pub struct AppState {
    pub config: Config,
    pub hub: RealtimeHub,
    /// Open realtime connections keyed by connection id
    pub connections: Cache<String, ConnCtx>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            hub: RealtimeHub::new(),
            connections: Cache::builder()
                .max_capacity(100_000)
                .build(),
        }
    }
}
