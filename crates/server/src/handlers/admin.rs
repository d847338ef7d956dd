//! Events available to administrator connections.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use floorcast_shared::{ClientCommand, HubError, ServerEvent};

use super::{PeerCtx, RoleHandler};
use crate::hub::Hub;

pub struct AdminHandler;

#[async_trait]
impl RoleHandler for AdminHandler {
    async fn handle(
        &self,
        hub: &Hub,
        ctx: &PeerCtx,
        cmd: &ClientCommand,
        _correlation: &str,
    ) -> Result<bool, HubError> {
        match cmd {
            ClientCommand::GlobalAnnouncement {
                title,
                message,
                severity,
            } => {
                info!(admin = %ctx.principal_id, %title, "global announcement");
                hub.emit_to_all(ServerEvent::GlobalAnnouncement {
                    title: title.clone(),
                    message: message.clone(),
                    severity: *severity,
                    from_principal_id: ctx.principal_id.clone(),
                    timestamp: Utc::now(),
                })
                .await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
