//! Events available to supervisor connections.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use floorcast_shared::{ClientCommand, HubError, Role, ServerEvent};

use super::{PeerCtx, RoleHandler};
use crate::hub::Hub;

pub struct SupervisorHandler;

#[async_trait]
impl RoleHandler for SupervisorHandler {
    async fn handle(
        &self,
        hub: &Hub,
        ctx: &PeerCtx,
        cmd: &ClientCommand,
        correlation: &str,
    ) -> Result<bool, HubError> {
        match cmd {
            ClientCommand::ListOnlineSellers => {
                let sellers = hub.roster_of(Role::Seller).await;
                hub.reply_to(
                    ctx.connection_id,
                    ServerEvent::OnlineSellers { sellers },
                    correlation,
                )
                .await;
                Ok(true)
            }
            ClientCommand::HelpReply {
                request_id,
                target_principal_id,
                reply,
            } => {
                // Routed to the requester's *current* connection; a requester
                // who went offline means the reply is dropped, not queued.
                let outcome = hub
                    .emit_to_identity(
                        target_principal_id,
                        ServerEvent::HelpReplyReceived {
                            request_id: request_id.clone(),
                            from_principal_id: ctx.principal_id.clone(),
                            reply: reply.clone(),
                            timestamp: Utc::now(),
                        },
                    )
                    .await;
                match outcome {
                    Ok(()) => {
                        info!(supervisor = %ctx.principal_id, %request_id, "help reply delivered")
                    }
                    Err(HubError::UnknownTarget) => {
                        debug!(%request_id, target = %target_principal_id, "help reply dropped, requester offline")
                    }
                    Err(_) => {}
                }
                Ok(true)
            }
            ClientCommand::BroadcastToSellers { message, severity } => {
                hub.emit_to_role(
                    Role::Seller,
                    ServerEvent::SellerBroadcast {
                        from_principal_id: ctx.principal_id.clone(),
                        from_display_name: ctx.display_name.clone(),
                        message: message.clone(),
                        severity: *severity,
                        timestamp: Utc::now(),
                    },
                )
                .await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
