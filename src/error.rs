use uuid::Uuid;

use crate::content::ResourceKind;
use crate::workflow::{Stage, Status};

/// Every failure the core can produce, typed for the HTTP layer to map to
/// transport responses. Nothing in this crate downgrades these to a generic
/// internal error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Authentication required")]
    Authentication,
    #[error("No active organization membership")]
    NoActiveOrganization,
    #[error("Authorization failed: {0}")]
    Authorization(String),
    #[error("Illegal transition '{action}' from {from:?} to {to:?}")]
    IllegalTransition {
        from: (Stage, Status),
        to: (Stage, Status),
        action: String,
    },
    #[error("Security violation: {0}")]
    Security(String),
    #[error("{kind:?} {id} not found")]
    NotFound { kind: ResourceKind, id: Uuid },
    #[error("Directory lookup failed: {0}")]
    Directory(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn conflicting_tenant_filter() -> Self {
        Self::Security("conflicting tenant filter".to_string())
    }

    /// Denials and rule violations, as opposed to infrastructure failures.
    pub fn is_denial(&self) -> bool {
        !matches!(self, Self::Directory(_) | Self::Storage(_))
    }
}
