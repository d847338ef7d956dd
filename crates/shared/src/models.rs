//! Data models shared between the floorcast server and client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access-scope category of an authenticated connection.
///
/// Closed enumeration: every role maps to exactly one room via [`Role::room`],
/// so there is no stringly-typed room naming anywhere in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Seller,
    Supervisor,
    Administrator,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Seller, Role::Supervisor, Role::Administrator];

    /// Room identifier for this role's broadcast group.
    pub fn room(&self) -> &'static str {
        match self {
            Role::Seller => "sellers",
            Role::Supervisor => "supervisors",
            Role::Administrator => "administrators",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Seller => write!(f, "seller"),
            Role::Supervisor => write!(f, "supervisor"),
            Role::Administrator => write!(f, "administrator"),
        }
    }
}

/// Severity of an announcement or broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Success,
}

/// Public view of a connected peer, as reported in rosters and presence events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub principal_id: String,
    pub display_name: String,
    pub role: Role,
    pub connected_at: DateTime<Utc>,
}

/// Per-role connection counts, one field per room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCounts {
    pub sellers: usize,
    pub supervisors: usize,
    pub administrators: usize,
}

impl RoleCounts {
    pub fn total(&self) -> usize {
        self.sellers + self.supervisors + self.administrators
    }
}

/// Live system metrics pushed periodically to monitoring connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Currently-authenticated connections.
    pub active_connections: usize,
    pub per_role_counts: RoleCounts,
    pub timestamp: DateTime<Utc>,
}
