//! Connection registry: the single source of truth for which connections are
//! live, who they belong to, and what role they hold.
//!
//! The registry keeps a principal → connection reverse index so directed
//! messages always resolve the *current* connection for an identity. A second
//! login from the same principal supersedes the index entry without closing
//! the older transport: the stale session keeps its room membership but
//! silently stops receiving directed traffic.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use floorcast_shared::{HubError, PeerInfo, Role, RoleCounts};

/// Transport-assigned connection identifier.
pub type ConnectionId = Uuid;

/// One live transport-level session.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    /// Set exactly once, by a successful authenticate handshake.
    pub principal_id: Option<String>,
    pub display_name: Option<String>,
    /// `None` while unauthenticated. `Some` implies `principal_id` is set.
    pub role: Option<Role>,
    pub connected_at: DateTime<Utc>,
    pub monitoring_active: bool,
    seq: u64,
}

impl Connection {
    pub fn is_authenticated(&self) -> bool {
        self.role.is_some()
    }

    /// Public view of this connection, `None` while unauthenticated.
    pub fn peer_info(&self) -> Option<PeerInfo> {
        Some(PeerInfo {
            principal_id: self.principal_id.clone()?,
            display_name: self.display_name.clone().unwrap_or_default(),
            role: self.role?,
            connected_at: self.connected_at,
        })
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    /// Principal → *current* connection for that identity.
    principals: HashMap<String, ConnectionId>,
    next_seq: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new unauthenticated connection. Always succeeds; registering
    /// an id twice keeps the existing entry.
    pub fn register(&mut self, id: ConnectionId) -> &Connection {
        let seq = self.next_seq;
        let entry = self.connections.entry(id).or_insert_with(|| Connection {
            id,
            principal_id: None,
            display_name: None,
            role: None,
            connected_at: Utc::now(),
            monitoring_active: false,
            seq,
        });
        if entry.seq == seq {
            self.next_seq += 1;
        }
        entry
    }

    /// Promote a connection to authenticated, exactly once.
    ///
    /// Returns `Ok(None)` when the connection has already been removed (a
    /// handshake racing a disconnect is a no-op, not an error). A repeat
    /// authenticate fails with [`HubError::AlreadyAuthenticated`] and leaves
    /// the original identity untouched.
    pub fn authenticate(
        &mut self,
        id: ConnectionId,
        principal_id: String,
        display_name: String,
        role: Role,
    ) -> Result<Option<PeerInfo>, HubError> {
        let Some(conn) = self.connections.get_mut(&id) else {
            return Ok(None);
        };
        if conn.is_authenticated() {
            return Err(HubError::AlreadyAuthenticated);
        }
        conn.principal_id = Some(principal_id.clone());
        conn.display_name = Some(display_name);
        conn.role = Some(role);
        // Supersedes any previous connection for this principal.
        self.principals.insert(principal_id, id);
        Ok(self.connections[&id].peer_info())
    }

    /// Current connection for a principal, if any.
    pub fn lookup_by_principal(&self, principal_id: &str) -> Option<&Connection> {
        let id = self.principals.get(principal_id)?;
        self.connections.get(id)
    }

    pub fn lookup_by_id(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Flip the monitoring flag. Returns `false` when the connection is gone
    /// or the flag already had the requested value.
    pub fn set_monitoring(&mut self, id: ConnectionId, active: bool) -> bool {
        match self.connections.get_mut(&id) {
            Some(conn) if conn.monitoring_active != active => {
                conn.monitoring_active = active;
                true
            }
            _ => false,
        }
    }

    /// Evict a connection. Idempotent; returns the removed entry so callers
    /// can decide whether a presence-leave notification is due.
    ///
    /// The principal index is cleared only if it still points at this
    /// connection — tearing down a superseded session must not unmap the
    /// session that replaced it.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let conn = self.connections.remove(&id)?;
        if let Some(principal) = &conn.principal_id {
            if self.principals.get(principal) == Some(&id) {
                self.principals.remove(principal);
            }
        }
        Some(conn)
    }

    /// Connections currently authenticated into `role`, in registration order.
    pub fn all_of(&self, role: Role) -> Vec<&Connection> {
        let mut out: Vec<&Connection> = self
            .connections
            .values()
            .filter(|c| c.role == Some(role))
            .collect();
        out.sort_by_key(|c| c.seq);
        out
    }

    /// All authenticated connections, in registration order.
    pub fn authenticated(&self) -> Vec<&Connection> {
        let mut out: Vec<&Connection> = self
            .connections
            .values()
            .filter(|c| c.is_authenticated())
            .collect();
        out.sort_by_key(|c| c.seq);
        out
    }

    pub fn counts(&self) -> RoleCounts {
        let mut counts = RoleCounts::default();
        for conn in self.connections.values() {
            match conn.role {
                Some(Role::Seller) => counts.sellers += 1,
                Some(Role::Supervisor) => counts.supervisors += 1,
                Some(Role::Administrator) => counts.administrators += 1,
                None => {}
            }
        }
        counts
    }
}
