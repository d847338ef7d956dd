//! Role-partitioned rooms, derived from the registry's view of each
//! connection's current role.
//!
//! Membership is never authoritative: a connection sits in exactly the room
//! of its current role, and `join` on a connection that already has a room
//! silently moves it (mid-session role reassignment is legal).

use std::collections::{HashMap, HashSet};

use floorcast_shared::Role;

use crate::registry::ConnectionId;

#[derive(Debug, Default)]
pub struct RoomManager {
    members: HashMap<Role, HashSet<ConnectionId>>,
    assignments: HashMap<ConnectionId, Role>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a connection into its role's room, moving it out of any previous
    /// room first.
    pub fn join(&mut self, id: ConnectionId, role: Role) {
        if let Some(previous) = self.assignments.insert(id, role) {
            if previous != role {
                if let Some(room) = self.members.get_mut(&previous) {
                    room.remove(&id);
                }
            }
        }
        self.members.entry(role).or_default().insert(id);
    }

    /// Remove a connection from its room. No-op for unknown connections.
    pub fn leave(&mut self, id: ConnectionId) {
        if let Some(role) = self.assignments.remove(&id) {
            if let Some(room) = self.members.get_mut(&role) {
                room.remove(&id);
            }
        }
    }

    pub fn members_of(&self, role: Role) -> impl Iterator<Item = ConnectionId> + '_ {
        self.members.get(&role).into_iter().flatten().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn join_then_leave_round_trip() {
        let mut rooms = RoomManager::new();
        let id = Uuid::new_v4();
        rooms.join(id, Role::Seller);
        assert!(rooms.members_of(Role::Seller).any(|m| m == id));

        rooms.leave(id);
        assert_eq!(rooms.members_of(Role::Seller).count(), 0);
    }

    #[test]
    fn rejoin_moves_between_rooms() {
        let mut rooms = RoomManager::new();
        let id = Uuid::new_v4();
        rooms.join(id, Role::Supervisor);
        rooms.join(id, Role::Administrator);
        assert_eq!(rooms.members_of(Role::Supervisor).count(), 0);
        assert_eq!(rooms.members_of(Role::Administrator).count(), 1);
    }

    #[test]
    fn leave_unknown_is_noop() {
        let mut rooms = RoomManager::new();
        rooms.leave(Uuid::new_v4());
        for role in Role::ALL {
            assert_eq!(rooms.members_of(role).count(), 0);
        }
    }

    #[test]
    fn rooms_partition_members_without_overlap() {
        let mut rooms = RoomManager::new();
        let ids: Vec<ConnectionId> = (0..6).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            rooms.join(*id, Role::ALL[i % Role::ALL.len()]);
        }
        rooms.leave(ids[0]);

        let mut seen = HashSet::new();
        for role in Role::ALL {
            for member in rooms.members_of(role) {
                assert!(seen.insert(member), "connection listed in two rooms");
            }
        }
        assert_eq!(seen.len(), ids.len() - 1);
    }
}
