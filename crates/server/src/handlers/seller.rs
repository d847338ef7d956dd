//! Events available to seller connections.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use floorcast_shared::{ClientCommand, HubError, Role, ServerEvent};

use super::{PeerCtx, RoleHandler};
use crate::hub::Hub;

pub struct SellerHandler;

#[async_trait]
impl RoleHandler for SellerHandler {
    async fn handle(
        &self,
        hub: &Hub,
        ctx: &PeerCtx,
        cmd: &ClientCommand,
        _correlation: &str,
    ) -> Result<bool, HubError> {
        match cmd {
            ClientCommand::HelpRequest {
                reason,
                description,
            } => {
                // Request id and sender identity are stamped here, never
                // taken from the payload.
                let request_id = Uuid::new_v4().to_string();
                let timestamp = Utc::now();
                info!(requester = %ctx.principal_id, %request_id, "help requested");

                hub.emit_to_connection(
                    ctx.connection_id,
                    ServerEvent::HelpRequestAck {
                        request_id: request_id.clone(),
                        message: "help request sent to supervisors".into(),
                    },
                )
                .await;

                hub.emit_to_role(
                    Role::Supervisor,
                    ServerEvent::HelpRequestReceived {
                        request_id,
                        requester_id: ctx.principal_id.clone(),
                        requester_name: ctx.display_name.clone(),
                        reason: reason.clone(),
                        description: description.clone(),
                        timestamp,
                    },
                )
                .await;
                Ok(true)
            }
            ClientCommand::ReportProblem {
                reason,
                description,
            } => {
                let report = ServerEvent::ProblemReported {
                    report_id: Uuid::new_v4().to_string(),
                    principal_id: ctx.principal_id.clone(),
                    display_name: ctx.display_name.clone(),
                    reason: reason.clone(),
                    description: description.clone(),
                    timestamp: Utc::now(),
                };
                info!(reporter = %ctx.principal_id, "problem reported");

                // The reporter gets the stamped report back as confirmation.
                hub.emit_to_connection(ctx.connection_id, report.clone()).await;
                hub.emit_to_role(Role::Supervisor, report.clone()).await;
                hub.emit_to_role(Role::Administrator, report).await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
