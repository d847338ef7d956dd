//! Periodic metrics feed for monitoring connections.
//!
//! One task per opted-in connection. The task holds only a hub back-reference
//! and re-checks liveness plus the monitoring flag on every tick, so a feed
//! can never outlive its connection even if the abort on disconnect races.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::hub::Hub;
use crate::registry::ConnectionId;

pub(crate) fn spawn_feed(hub: Hub, id: ConnectionId, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately; the feed starts one period in.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !hub.push_snapshot(id).await {
                break;
            }
        }
        debug!(connection = %id, "monitoring feed ended");
    })
}
