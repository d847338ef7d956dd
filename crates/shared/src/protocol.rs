//! Wire protocol: the event envelope and the bidirectional event vocabulary.
//!
//! Every frame on the wire is an [`Envelope`] whose payload is either a
//! [`ClientCommand`] (client → server) or a [`ServerEvent`] (server → client).
//! Payloads are relayed verbatim; the router only inspects the fields it
//! needs for routing decisions (target principal, request id).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PeerInfo, Role, RoleCounts, Severity};

/// Envelope wrapping every wire event with an id, timestamp and optional
/// correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn correlated(payload: T, correlation_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
            correlation_id: Some(correlation_id.into()),
        }
    }
}

/// Events a client sends to the routing node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    /// One-shot handshake promoting the connection to authenticated.
    Authenticate {
        principal_id: String,
        display_name: String,
        role: Role,
    },
    /// Opt in to the periodic metrics feed.
    StartMonitoring,
    /// Opt out of the periodic metrics feed.
    StopMonitoring,
    /// Directed message to one principal, best-effort.
    DirectMessage {
        target_principal_id: String,
        message: String,
    },
    /// Request the roster of currently-authenticated peers.
    ListConnected,
    Ping,
    /// Seller: ask the supervisor room for help. The server stamps the
    /// request id and the sender identity.
    HelpRequest { reason: String, description: String },
    /// Supervisor: roster of the sellers currently online.
    ListOnlineSellers,
    /// Supervisor: reply to an outstanding help request. Routed to the
    /// requester's *current* connection.
    HelpReply {
        request_id: String,
        target_principal_id: String,
        reply: String,
    },
    /// Seller: report a problem to supervisors and administrators.
    ReportProblem { reason: String, description: String },
    /// Supervisor: broadcast to every seller.
    BroadcastToSellers {
        message: String,
        #[serde(default)]
        severity: Severity,
    },
    /// Administrator: announce to every authenticated connection.
    GlobalAnnouncement {
        title: String,
        message: String,
        #[serde(default)]
        severity: Severity,
    },
}

/// Events the routing node sends to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Authenticated {
        success: bool,
        role: Role,
        message: String,
    },
    MetricsSnapshot {
        active_connections: usize,
        per_role_counts: RoleCounts,
        timestamp: DateTime<Utc>,
    },
    MonitoringStarted {
        timestamp: DateTime<Utc>,
    },
    MonitoringStopped {
        timestamp: DateTime<Utc>,
    },
    DirectMessageReceived {
        from_principal_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Roster {
        peers: Vec<PeerInfo>,
    },
    OnlineSellers {
        sellers: Vec<PeerInfo>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    HelpRequestAck {
        request_id: String,
        message: String,
    },
    HelpRequestReceived {
        request_id: String,
        requester_id: String,
        requester_name: String,
        reason: String,
        description: String,
        timestamp: DateTime<Utc>,
    },
    HelpReplyReceived {
        request_id: String,
        from_principal_id: String,
        reply: String,
        timestamp: DateTime<Utc>,
    },
    ProblemReported {
        report_id: String,
        principal_id: String,
        display_name: String,
        reason: String,
        description: String,
        timestamp: DateTime<Utc>,
    },
    SellerBroadcast {
        from_principal_id: String,
        from_display_name: String,
        message: String,
        severity: Severity,
        timestamp: DateTime<Utc>,
    },
    PresenceJoined {
        principal_id: String,
        display_name: String,
        role: Role,
        timestamp: DateTime<Utc>,
    },
    PresenceLeft {
        principal_id: String,
        display_name: String,
        role: Role,
        timestamp: DateTime<Utc>,
    },
    GlobalAnnouncement {
        title: String,
        message: String,
        severity: Severity,
        from_principal_id: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<String>,
    },
}
