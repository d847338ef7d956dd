//! Floorcast client: a managed WebSocket connection with an authenticate
//! handshake, bounded-retry reconnection and monitoring re-subscription.

pub mod connection;

pub use connection::FloorcastClient;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc::UnboundedSender;

use floorcast_shared::{ClientCommand, Envelope, Role, Severity};

/// Connection state of the managed WebSocket.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    /// Attempt 0 is the initial connect; anything above is a reconnect.
    Connecting { attempt: u32 },
    Connected,
    /// Transport is up, authenticate handshake in flight.
    Authenticating,
    /// Authenticated and participating.
    Ready,
    /// Retry budget exhausted. Terminal; a new client must be created.
    GaveUp { reason: String },
}

impl ConnectionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting { .. } | ConnectionState::Authenticating
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::GaveUp { .. })
    }
}

/// Reconnect behavior: linearly increasing backoff with a fixed attempt
/// ceiling. Exceeding the ceiling surfaces as [`ConnectionState::GaveUp`];
/// the client never retries indefinitely.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl ReconnectConfig {
    /// Backoff before the given attempt: `attempt × base_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Identity presented in the authenticate handshake. The server trusts it as
/// given; verifying it is the caller's concern.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub principal_id: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. "ws://localhost:8080/ws".
    pub url: String,
    pub credentials: Credentials,
    pub reconnect: ReconnectConfig,
}

/// Handle for sending commands through the managed connection.
///
/// Commands queued while the transport is down are flushed on reconnect.
#[derive(Clone)]
pub struct ClientHandle {
    sender: UnboundedSender<Envelope<ClientCommand>>,
    monitoring: Arc<AtomicBool>,
}

impl ClientHandle {
    pub(crate) fn new(
        sender: UnboundedSender<Envelope<ClientCommand>>,
        monitoring: Arc<AtomicBool>,
    ) -> Self {
        Self { sender, monitoring }
    }

    /// Send a command to the server.
    pub fn send(&self, cmd: ClientCommand) -> Result<(), String> {
        self.sender
            .unbounded_send(Envelope::new(cmd))
            .map_err(|e| format!("failed to send: {e}"))
    }

    /// Opt in to the periodic metrics feed. Remembered locally so the
    /// subscription is re-issued after a reconnect.
    pub fn start_monitoring(&self) -> Result<(), String> {
        self.monitoring.store(true, Ordering::SeqCst);
        self.send(ClientCommand::StartMonitoring)
    }

    pub fn stop_monitoring(&self) -> Result<(), String> {
        self.monitoring.store(false, Ordering::SeqCst);
        self.send(ClientCommand::StopMonitoring)
    }

    pub fn help_request(&self, reason: &str, description: &str) -> Result<(), String> {
        self.send(ClientCommand::HelpRequest {
            reason: reason.to_string(),
            description: description.to_string(),
        })
    }

    pub fn help_reply(
        &self,
        request_id: &str,
        target_principal_id: &str,
        reply: &str,
    ) -> Result<(), String> {
        self.send(ClientCommand::HelpReply {
            request_id: request_id.to_string(),
            target_principal_id: target_principal_id.to_string(),
            reply: reply.to_string(),
        })
    }

    pub fn direct_message(&self, target_principal_id: &str, message: &str) -> Result<(), String> {
        self.send(ClientCommand::DirectMessage {
            target_principal_id: target_principal_id.to_string(),
            message: message.to_string(),
        })
    }

    pub fn report_problem(&self, reason: &str, description: &str) -> Result<(), String> {
        self.send(ClientCommand::ReportProblem {
            reason: reason.to_string(),
            description: description.to_string(),
        })
    }

    pub fn broadcast_to_sellers(&self, message: &str, severity: Severity) -> Result<(), String> {
        self.send(ClientCommand::BroadcastToSellers {
            message: message.to_string(),
            severity,
        })
    }

    pub fn announce(&self, title: &str, message: &str, severity: Severity) -> Result<(), String> {
        self.send(ClientCommand::GlobalAnnouncement {
            title: title.to_string(),
            message: message.to_string(),
            severity,
        })
    }

    pub fn list_connected(&self) -> Result<(), String> {
        self.send(ClientCommand::ListConnected)
    }

    pub fn list_online_sellers(&self) -> Result<(), String> {
        self.send(ClientCommand::ListOnlineSellers)
    }

    pub fn ping(&self) -> Result<(), String> {
        self.send(ClientCommand::Ping)
    }
}
