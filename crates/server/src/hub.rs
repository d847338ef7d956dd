//! The hub owns all shared connection state and exposes the broadcast
//! primitives.
//!
//! Registry, rooms, outbound senders and monitor task handles live behind a
//! single `RwLock`, so every mutation follows one synchronization discipline
//! and every fanout re-resolves its targets from the registry at send time.
//! Outbound delivery goes through per-connection unbounded channels, so no
//! broadcast ever blocks on transport I/O while the lock is held.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use floorcast_shared::{Envelope, HubError, MetricsSnapshot, PeerInfo, Role, ServerEvent};

use crate::monitor;
use crate::registry::{Connection, ConnectionId, ConnectionRegistry};
use crate::rooms::RoomManager;

/// Outbound half of a connection: events pushed here are forwarded to the
/// transport by the connection's send task.
pub type OutboundSender = mpsc::UnboundedSender<Envelope<ServerEvent>>;

#[derive(Default)]
struct HubState {
    registry: ConnectionRegistry,
    rooms: RoomManager,
    senders: HashMap<ConnectionId, OutboundSender>,
    monitors: HashMap<ConnectionId, JoinHandle<()>>,
}

impl HubState {
    fn send_to(&self, id: ConnectionId, envelope: Envelope<ServerEvent>) -> bool {
        match self.senders.get(&id) {
            // A closed channel means the connection is tearing down; the
            // registry eviction will follow shortly.
            Some(tx) => tx.send(envelope).is_ok(),
            None => false,
        }
    }
}

#[derive(Clone)]
pub struct Hub {
    inner: Arc<RwLock<HubState>>,
    monitor_interval: Duration,
}

impl Hub {
    pub fn new(monitor_interval: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HubState::default())),
            monitor_interval,
        }
    }

    /// Record a new transport connection, still unauthenticated.
    pub async fn connect(&self, id: ConnectionId, sender: OutboundSender) {
        let mut state = self.inner.write().await;
        state.registry.register(id);
        state.senders.insert(id, sender);
        debug!(connection = %id, "connection registered");
    }

    /// Run the authenticate handshake for a connection.
    ///
    /// On success the connection joins its role room, gets an `authenticated`
    /// confirmation, and the rest of the room is told about the arrival.
    /// Returns `Ok(None)` when the connection raced a disconnect.
    pub async fn authenticate(
        &self,
        id: ConnectionId,
        principal_id: String,
        display_name: String,
        role: Role,
    ) -> Result<Option<PeerInfo>, HubError> {
        let mut state = self.inner.write().await;
        let Some(info) = state
            .registry
            .authenticate(id, principal_id, display_name, role)?
        else {
            return Ok(None);
        };
        state.rooms.join(id, role);

        state.send_to(
            id,
            Envelope::new(ServerEvent::Authenticated {
                success: true,
                role,
                message: "authentication successful".into(),
            }),
        );

        let joined = Envelope::new(ServerEvent::PresenceJoined {
            principal_id: info.principal_id.clone(),
            display_name: info.display_name.clone(),
            role,
            timestamp: Utc::now(),
        });
        for member in state.rooms.members_of(role).collect::<Vec<_>>() {
            if member != id {
                state.send_to(member, joined.clone());
            }
        }

        debug!(connection = %id, principal = %info.principal_id, %role, "authenticated");
        Ok(Some(info))
    }

    /// Tear down a connection. Idempotent.
    ///
    /// Ordering matters: the registry entry, room membership and monitor task
    /// all go away *before* the former room hears about the departure, so a
    /// notified member can never observe stale membership.
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut state = self.inner.write().await;
        if let Some(handle) = state.monitors.remove(&id) {
            handle.abort();
        }
        state.senders.remove(&id);
        let Some(removed) = state.registry.remove(id) else {
            return;
        };
        state.rooms.leave(id);

        if let Some(info) = removed.peer_info() {
            let left = Envelope::new(ServerEvent::PresenceLeft {
                principal_id: info.principal_id.clone(),
                display_name: info.display_name,
                role: info.role,
                timestamp: Utc::now(),
            });
            for member in state.rooms.members_of(info.role).collect::<Vec<_>>() {
                state.send_to(member, left.clone());
            }
            debug!(connection = %id, principal = %info.principal_id, "disconnected");
        } else {
            debug!(connection = %id, "unauthenticated connection closed");
        }
    }

    /// Broadcast to every connection currently in a role's room. An empty
    /// room is not an error.
    pub async fn emit_to_role(&self, role: Role, event: ServerEvent) {
        let state = self.inner.read().await;
        let envelope = Envelope::new(event);
        for member in state.rooms.members_of(role) {
            state.send_to(member, envelope.clone());
        }
    }

    /// Directed delivery to a principal's current connection. Best-effort:
    /// callers treat [`HubError::UnknownTarget`] as a silent drop, never as a
    /// failure surfaced to the sender.
    pub async fn emit_to_identity(
        &self,
        principal_id: &str,
        event: ServerEvent,
    ) -> Result<(), HubError> {
        let state = self.inner.read().await;
        let Some(conn) = state.registry.lookup_by_principal(principal_id) else {
            return Err(HubError::UnknownTarget);
        };
        state.send_to(conn.id, Envelope::new(event));
        Ok(())
    }

    /// Broadcast to every authenticated connection.
    pub async fn emit_to_all(&self, event: ServerEvent) {
        let state = self.inner.read().await;
        let envelope = Envelope::new(event);
        for conn in state.registry.authenticated() {
            state.send_to(conn.id, envelope.clone());
        }
    }

    /// Direct-by-transport-id delivery, used for replying to the caller.
    pub async fn emit_to_connection(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let state = self.inner.read().await;
        state.send_to(id, Envelope::new(event))
    }

    /// Correlated reply to the caller of an inbound event.
    pub async fn reply_to(
        &self,
        id: ConnectionId,
        event: ServerEvent,
        correlation_id: impl Into<String>,
    ) -> bool {
        let state = self.inner.read().await;
        state.send_to(id, Envelope::correlated(event, correlation_id))
    }

    /// Error event to the offending connection only.
    pub async fn reply_error(
        &self,
        id: ConnectionId,
        error: &HubError,
        correlation_id: Option<String>,
    ) {
        let state = self.inner.read().await;
        state.send_to(
            id,
            Envelope::new(ServerEvent::Error {
                code: error.code().into(),
                message: error.to_string(),
                correlation_id,
            }),
        );
    }

    /// Begin the periodic metrics push for a connection. No-op when the
    /// connection is gone or the feed is already active.
    pub async fn start_monitoring(&self, id: ConnectionId) {
        let mut state = self.inner.write().await;
        if !state.registry.set_monitoring(id, true) {
            return;
        }
        let handle = monitor::spawn_feed(self.clone(), id, self.monitor_interval);
        state.monitors.insert(id, handle);
        state.send_to(
            id,
            Envelope::new(ServerEvent::MonitoringStarted {
                timestamp: Utc::now(),
            }),
        );
        debug!(connection = %id, "monitoring feed started");
    }

    /// Stop the periodic metrics push. No-op when not active.
    pub async fn stop_monitoring(&self, id: ConnectionId) {
        let mut state = self.inner.write().await;
        if !state.registry.set_monitoring(id, false) {
            return;
        }
        if let Some(handle) = state.monitors.remove(&id) {
            handle.abort();
        }
        state.send_to(
            id,
            Envelope::new(ServerEvent::MonitoringStopped {
                timestamp: Utc::now(),
            }),
        );
        debug!(connection = %id, "monitoring feed stopped");
    }

    /// One metrics tick: re-checks liveness and the monitoring flag, then
    /// pushes a snapshot. Returns `false` when the feed must self-terminate.
    pub(crate) async fn push_snapshot(&self, id: ConnectionId) -> bool {
        let state = self.inner.read().await;
        let live = matches!(
            state.registry.lookup_by_id(id),
            Some(conn) if conn.monitoring_active
        );
        if !live {
            return false;
        }
        let counts = state.registry.counts();
        state.send_to(
            id,
            Envelope::new(ServerEvent::MetricsSnapshot {
                active_connections: counts.total(),
                per_role_counts: counts,
                timestamp: Utc::now(),
            }),
        )
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.read().await;
        let counts = state.registry.counts();
        MetricsSnapshot {
            active_connections: counts.total(),
            per_role_counts: counts,
            timestamp: Utc::now(),
        }
    }

    /// Roster of authenticated peers, in registration order.
    pub async fn roster(&self) -> Vec<PeerInfo> {
        let state = self.inner.read().await;
        state
            .registry
            .authenticated()
            .into_iter()
            .filter_map(|c| c.peer_info())
            .collect()
    }

    /// Roster filtered to one role, in registration order.
    pub async fn roster_of(&self, role: Role) -> Vec<PeerInfo> {
        let state = self.inner.read().await;
        state
            .registry
            .all_of(role)
            .into_iter()
            .filter_map(|c| c.peer_info())
            .collect()
    }

    /// Snapshot of a connection's registry entry, re-resolved at call time.
    pub async fn connection(&self, id: ConnectionId) -> Option<Connection> {
        let state = self.inner.read().await;
        state.registry.lookup_by_id(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floorcast_shared::Severity;
    use uuid::Uuid;

    type Outbound = mpsc::UnboundedReceiver<Envelope<ServerEvent>>;

    fn test_hub() -> Hub {
        Hub::new(Duration::from_millis(10))
    }

    async fn join(hub: &Hub, principal: &str, role: Role) -> (ConnectionId, Outbound) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.connect(id, tx).await;
        hub.authenticate(id, principal.into(), format!("{principal} name"), role)
            .await
            .unwrap()
            .unwrap();
        (id, rx)
    }

    fn drain(rx: &mut Outbound) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(env) = rx.try_recv() {
            out.push(env.payload);
        }
        out
    }

    #[tokio::test]
    async fn authenticate_confirms_and_notifies_room() {
        let hub = test_hub();
        let (_a, mut a_rx) = join(&hub, "u1", Role::Seller).await;
        let (_b, mut b_rx) = join(&hub, "u2", Role::Seller).await;

        let a_events = drain(&mut a_rx);
        assert!(matches!(
            a_events[0],
            ServerEvent::Authenticated { success: true, role: Role::Seller, .. }
        ));
        // The earlier seller saw the later one arrive, not itself.
        assert!(a_events.iter().any(
            |e| matches!(e, ServerEvent::PresenceJoined { principal_id, .. } if principal_id == "u2")
        ));
        let b_events = drain(&mut b_rx);
        assert_eq!(
            b_events
                .iter()
                .filter(|e| matches!(e, ServerEvent::PresenceJoined { .. }))
                .count(),
            0
        );
    }

    #[tokio::test]
    async fn double_authenticate_fails() {
        let hub = test_hub();
        let (id, _rx) = join(&hub, "u1", Role::Seller).await;
        let err = hub
            .authenticate(id, "u9".into(), "imp".into(), Role::Administrator)
            .await
            .unwrap_err();
        assert_eq!(err, HubError::AlreadyAuthenticated);
        let conn = hub.connection(id).await.unwrap();
        assert_eq!(conn.principal_id.as_deref(), Some("u1"));
        assert_eq!(conn.role, Some(Role::Seller));
    }

    #[tokio::test]
    async fn role_broadcast_reaches_exactly_that_room() {
        let hub = test_hub();
        let (_s1, mut s1) = join(&hub, "s1", Role::Seller).await;
        let (_s2, mut s2) = join(&hub, "s2", Role::Seller).await;
        let (_s3, mut s3) = join(&hub, "s3", Role::Seller).await;
        let (_v1, mut v1) = join(&hub, "v1", Role::Supervisor).await;
        for rx in [&mut s1, &mut s2, &mut s3, &mut v1] {
            drain(rx);
        }

        hub.emit_to_role(
            Role::Seller,
            ServerEvent::GlobalAnnouncement {
                title: "floor".into(),
                message: "closing soon".into(),
                severity: Severity::Info,
                from_principal_id: "admin".into(),
                timestamp: Utc::now(),
            },
        )
        .await;

        for rx in [&mut s1, &mut s2, &mut s3] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            assert!(matches!(events[0], ServerEvent::GlobalAnnouncement { .. }));
        }
        assert!(drain(&mut v1).is_empty());
    }

    #[tokio::test]
    async fn emit_to_identity_unknown_is_silent() {
        let hub = test_hub();
        let (_a, mut a_rx) = join(&hub, "u1", Role::Seller).await;
        drain(&mut a_rx);

        let err = hub
            .emit_to_identity(
                "ghost",
                ServerEvent::Pong {
                    timestamp: Utc::now(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, HubError::UnknownTarget);
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn reconnect_routes_directed_traffic_to_new_connection() {
        let hub = test_hub();
        let (old, mut old_rx) = join(&hub, "u1", Role::Seller).await;
        hub.disconnect(old).await;
        let (_new, mut new_rx) = join(&hub, "u1", Role::Seller).await;
        drain(&mut old_rx);
        drain(&mut new_rx);

        hub.emit_to_identity(
            "u1",
            ServerEvent::DirectMessageReceived {
                from_principal_id: "v1".into(),
                message: "hello".into(),
                timestamp: Utc::now(),
            },
        )
        .await
        .unwrap();

        assert!(drain(&mut old_rx).is_empty());
        let events = drain(&mut new_rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::DirectMessageReceived { .. }]
        ));
    }

    #[tokio::test]
    async fn superseded_session_keeps_room_but_loses_directed_traffic() {
        let hub = test_hub();
        let (_old, mut old_rx) = join(&hub, "u1", Role::Seller).await;
        let (_new, mut new_rx) = join(&hub, "u1", Role::Seller).await;
        drain(&mut old_rx);
        drain(&mut new_rx);

        hub.emit_to_identity(
            "u1",
            ServerEvent::Pong {
                timestamp: Utc::now(),
            },
        )
        .await
        .unwrap();
        assert!(drain(&mut old_rx).is_empty());
        assert_eq!(drain(&mut new_rx).len(), 1);

        // Role broadcasts still reach the stale session.
        hub.emit_to_role(
            Role::Seller,
            ServerEvent::Pong {
                timestamp: Utc::now(),
            },
        )
        .await;
        assert_eq!(drain(&mut old_rx).len(), 1);
        assert_eq!(drain(&mut new_rx).len(), 1);
    }

    #[tokio::test]
    async fn disconnect_notifies_room_after_eviction() {
        let hub = test_hub();
        let (a, _a_rx) = join(&hub, "u1", Role::Seller).await;
        let (_b, mut b_rx) = join(&hub, "u2", Role::Seller).await;
        drain(&mut b_rx);

        hub.disconnect(a).await;
        hub.disconnect(a).await; // idempotent

        let events = drain(&mut b_rx);
        let left: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::PresenceLeft { principal_id, .. } if principal_id == "u1"))
            .collect();
        assert_eq!(left.len(), 1, "presence-left emitted exactly once");
        assert!(hub.connection(a).await.is_none());
        assert_eq!(hub.roster_of(Role::Seller).await.len(), 1);
    }

    #[tokio::test]
    async fn emit_to_all_skips_unauthenticated() {
        let hub = test_hub();
        let (_a, mut a_rx) = join(&hub, "u1", Role::Seller).await;
        let ghost = Uuid::new_v4();
        let (ghost_tx, mut ghost_rx) = mpsc::unbounded_channel();
        hub.connect(ghost, ghost_tx).await;
        drain(&mut a_rx);

        hub.emit_to_all(ServerEvent::Pong {
            timestamp: Utc::now(),
        })
        .await;

        assert_eq!(drain(&mut a_rx).len(), 1);
        assert!(ghost_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn monitoring_feed_pushes_until_stopped() {
        let hub = test_hub();
        let (id, mut rx) = join(&hub, "u1", Role::Supervisor).await;
        drain(&mut rx);

        hub.start_monitoring(id).await;
        hub.start_monitoring(id).await; // no-op, must not double-start
        tokio::time::sleep(Duration::from_millis(35)).await;

        let snapshots = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::MetricsSnapshot { .. }))
            .count();
        assert!(snapshots >= 1, "expected periodic snapshots");
        assert!(snapshots <= 4, "double-started feed would tick twice per period");

        hub.stop_monitoring(id).await;
        drain(&mut rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            drain(&mut rx)
                .iter()
                .all(|e| !matches!(e, ServerEvent::MetricsSnapshot { .. })),
            "no snapshots after stop"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_monitoring_feed() {
        let hub = test_hub();
        let (id, mut rx) = join(&hub, "u1", Role::Administrator).await;
        hub.start_monitoring(id).await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        hub.disconnect(id).await;
        drain(&mut rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn rooms_mirror_authenticated_connections() {
        let hub = test_hub();
        let (_a, _a_rx) = join(&hub, "a", Role::Seller).await;
        let (b, _b_rx) = join(&hub, "b", Role::Supervisor).await;
        let (_c, _c_rx) = join(&hub, "c", Role::Seller).await;
        // Unauthenticated connection stays out of every room.
        let ghost = Uuid::new_v4();
        let (ghost_tx, _ghost_rx) = mpsc::unbounded_channel();
        hub.connect(ghost, ghost_tx).await;
        hub.disconnect(b).await;
        // Duplicate principal: the superseded session stays roomed too.
        let (_d, _d_rx) = join(&hub, "a", Role::Administrator).await;

        let state = hub.inner.read().await;
        let mut roomed: Vec<ConnectionId> = Vec::new();
        for role in Role::ALL {
            roomed.extend(state.rooms.members_of(role));
        }
        roomed.sort();
        let before = roomed.len();
        roomed.dedup();
        assert_eq!(roomed.len(), before, "connection listed in two rooms");

        let mut authed: Vec<ConnectionId> =
            state.registry.authenticated().iter().map(|c| c.id).collect();
        authed.sort();
        assert_eq!(roomed, authed);
    }

    #[tokio::test]
    async fn snapshot_counts_by_role() {
        let hub = test_hub();
        let _a = join(&hub, "a", Role::Seller).await;
        let _b = join(&hub, "b", Role::Seller).await;
        let _c = join(&hub, "c", Role::Administrator).await;

        let snap = hub.snapshot().await;
        assert_eq!(snap.active_connections, 3);
        assert_eq!(snap.per_role_counts.sellers, 2);
        assert_eq!(snap.per_role_counts.administrators, 1);
    }
}
