//! Error taxonomy for the routing core.

use thiserror::Error;

use crate::models::Role;

/// Errors raised by the connection registry and event router.
///
/// None of these are fatal: every variant is reported to the offending
/// connection only, never broadcast, and never tears down shared state.
/// `UnknownTarget` in particular stays internal — directed delivery is
/// best-effort, so the sender is never told about it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("connection is already authenticated")]
    AlreadyAuthenticated,
    #[error("connection is not authenticated")]
    NotAuthenticated,
    #[error("event is not permitted for role `{0}`")]
    RoleNotPermitted(Role),
    #[error("target principal is not currently connected")]
    UnknownTarget,
}

impl HubError {
    /// Stable wire code carried in the `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            HubError::AlreadyAuthenticated => "ALREADY_AUTHENTICATED",
            HubError::NotAuthenticated => "NOT_AUTHENTICATED",
            HubError::RoleNotPermitted(_) => "ROLE_NOT_PERMITTED",
            HubError::UnknownTarget => "UNKNOWN_TARGET",
        }
    }
}
