//! Domain errors

use crate::domain::shared::value_objects::SessionId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The id is unknown or the session was already torn down
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Session already exists: {0}")]
    DuplicateSession(SessionId),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Outgoing calls are unavailable")]
    Unavailable,
}

impl DomainError {
    /// Benign races the platform can trigger at any time. Callers log these
    /// and carry on.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            DomainError::SessionNotFound(_) | DomainError::InvalidStateTransition(_)
        )
    }
}
