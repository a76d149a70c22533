//! Application state.

use std::sync::Arc;

use edumart_queue::RoomChannel;

use crate::config::GatewayConfig;
use crate::hub::RoomHub;
use crate::middleware::RateLimiterCache;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub hub: Arc<RoomHub>,
    pub rate_limiter: Arc<RateLimiterCache>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let channel = RoomChannel::from_env()?;
        let hub = RoomHub::new(channel);
        let rate_limiter = Arc::new(RateLimiterCache::new(config.rate_limit_rps));

        Ok(Self {
            config,
            hub,
            rate_limiter,
        })
    }
}
