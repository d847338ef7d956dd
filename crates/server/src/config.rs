//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket endpoint binds to.
    pub bind: SocketAddr,
    /// Period of the per-connection metrics feed.
    pub monitor_interval: Duration,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FLOORCAST_BIND`: listen address (default: "0.0.0.0:8080")
    /// - `FLOORCAST_MONITOR_INTERVAL_SECS`: metrics feed period (default: 10)
    pub fn from_env() -> Self {
        let bind = std::env::var("FLOORCAST_BIND")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let monitor_interval = std::env::var("FLOORCAST_MONITOR_INTERVAL_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        Self {
            bind,
            monitor_interval,
        }
    }
}
