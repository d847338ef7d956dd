//! Event routing: maps inbound commands, scoped by the sender's current
//! role, to at most one handler.
//!
//! Role handler sets are registered once at startup and looked up by the
//! connection's role at dispatch time — never cached at subscribe time — so
//! a mid-session role change takes effect on the very next event. The
//! router, not the client, supplies the sender identity on everything it
//! fans out.

mod admin;
mod seller;
mod supervisor;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use floorcast_shared::{ClientCommand, Envelope, HubError, Role, ServerEvent};

use crate::hub::Hub;
use crate::registry::ConnectionId;

pub use admin::AdminHandler;
pub use seller::SellerHandler;
pub use supervisor::SupervisorHandler;

/// Sender identity for one inbound event, resolved from the registry at
/// dispatch time. Handlers never see client-supplied identity fields.
#[derive(Debug, Clone)]
pub struct PeerCtx {
    pub connection_id: ConnectionId,
    pub principal_id: String,
    pub display_name: String,
    pub role: Role,
}

/// One role's event handler set.
#[async_trait]
pub trait RoleHandler: Send + Sync {
    /// Handle `cmd` for a connection currently in this role. `correlation`
    /// is the inbound envelope id, for correlated replies. Returns
    /// `Ok(true)` when the command was consumed, `Ok(false)` when this
    /// role's set has no handler for it.
    async fn handle(
        &self,
        hub: &Hub,
        ctx: &PeerCtx,
        cmd: &ClientCommand,
        correlation: &str,
    ) -> Result<bool, HubError>;
}

/// Dispatch table from role to handler set, built once at startup.
pub struct EventRouter {
    handlers: HashMap<Role, Arc<dyn RoleHandler>>,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRouter {
    pub fn new() -> Self {
        let mut handlers: HashMap<Role, Arc<dyn RoleHandler>> = HashMap::new();
        handlers.insert(Role::Seller, Arc::new(SellerHandler));
        handlers.insert(Role::Supervisor, Arc::new(SupervisorHandler));
        handlers.insert(Role::Administrator, Arc::new(AdminHandler));
        Self { handlers }
    }

    /// Route one inbound envelope from `connection_id`.
    ///
    /// A connection that disappeared mid-dispatch is a no-op; every error is
    /// reported to the offending connection only.
    pub async fn dispatch(
        &self,
        hub: &Hub,
        connection_id: ConnectionId,
        envelope: Envelope<ClientCommand>,
    ) {
        let correlation = envelope.id;

        if let ClientCommand::Authenticate {
            principal_id,
            display_name,
            role,
        } = &envelope.payload
        {
            match hub
                .authenticate(
                    connection_id,
                    principal_id.clone(),
                    display_name.clone(),
                    *role,
                )
                .await
            {
                Ok(_) => {}
                Err(err) => {
                    warn!(connection = %connection_id, %err, "authenticate rejected");
                    hub.reply_error(connection_id, &err, Some(correlation)).await;
                }
            }
            return;
        }

        // Re-resolve the sender from the registry: role checks must see the
        // current role, and a raced disconnect must become a no-op.
        let Some(conn) = hub.connection(connection_id).await else {
            return;
        };
        let (Some(principal_id), Some(role)) = (conn.principal_id.clone(), conn.role) else {
            hub.reply_error(
                connection_id,
                &HubError::NotAuthenticated,
                Some(correlation),
            )
            .await;
            return;
        };
        let ctx = PeerCtx {
            connection_id,
            principal_id,
            display_name: conn.display_name.unwrap_or_default(),
            role,
        };

        if handle_common(hub, &ctx, &envelope.payload, &correlation).await {
            return;
        }

        let Some(handler) = self.handlers.get(&role) else {
            // Unreachable with the closed role enum, but never panic on it.
            return;
        };
        match handler.handle(hub, &ctx, &envelope.payload, &correlation).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(connection = %connection_id, %role, "command not permitted for role");
                hub.reply_error(
                    connection_id,
                    &HubError::RoleNotPermitted(role),
                    Some(correlation),
                )
                .await;
            }
            Err(err) => {
                hub.reply_error(connection_id, &err, Some(correlation)).await;
            }
        }
    }
}

/// Commands available to every authenticated connection, regardless of role.
async fn handle_common(hub: &Hub, ctx: &PeerCtx, cmd: &ClientCommand, correlation: &str) -> bool {
    match cmd {
        ClientCommand::StartMonitoring => {
            hub.start_monitoring(ctx.connection_id).await;
            true
        }
        ClientCommand::StopMonitoring => {
            hub.stop_monitoring(ctx.connection_id).await;
            true
        }
        ClientCommand::DirectMessage {
            target_principal_id,
            message,
        } => {
            // Fire-and-forget: an offline target is dropped, never reported
            // back to the sender.
            if let Err(HubError::UnknownTarget) = hub
                .emit_to_identity(
                    target_principal_id,
                    ServerEvent::DirectMessageReceived {
                        from_principal_id: ctx.principal_id.clone(),
                        message: message.clone(),
                        timestamp: Utc::now(),
                    },
                )
                .await
            {
                debug!(target = %target_principal_id, "direct message dropped, target offline");
            }
            true
        }
        ClientCommand::ListConnected => {
            let peers = hub.roster().await;
            hub.reply_to(
                ctx.connection_id,
                ServerEvent::Roster { peers },
                correlation,
            )
            .await;
            true
        }
        ClientCommand::Ping => {
            hub.reply_to(
                ctx.connection_id,
                ServerEvent::Pong {
                    timestamp: Utc::now(),
                },
                correlation,
            )
            .await;
            true
        }
        _ => false,
    }
}
