//! Error taxonomy shared by every service and MCP handler.

use thiserror::Error;

/// Coarse classification of a [`CoordinationError`], used by handlers to
/// decide how to shape a tool response and by callers to decide whether a
/// retry is sensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    InvalidState,
    Conflict,
    Timeout,
    Cancelled,
    BusDisposed,
    Internal,
}

/// The single error type threaded through store, bus, service, and MCP
/// handler layers.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct CoordinationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoordinationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn bus_disposed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BusDisposed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Transport-facing message, stable and actionable per spec §7.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::InvalidInput | ErrorKind::InvalidState | ErrorKind::NotFound
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout | ErrorKind::Cancelled)
    }
}

impl From<sqlx::Error> for CoordinationError {
    fn from(err: sqlx::Error) -> Self {
        CoordinationError::internal(format!("database error: {err}"))
    }
}

impl From<serde_json::Error> for CoordinationError {
    fn from(err: serde_json::Error) -> Self {
        CoordinationError::internal(format!("serialization error: {err}"))
    }
}

pub type CoordinationResult<T> = Result<T, CoordinationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_permanent() {
        let err = CoordinationError::not_found("agent missing");
        assert!(err.is_permanent());
        assert!(!err.is_transient());
    }

    #[test]
    fn timeout_is_transient() {
        let err = CoordinationError::timeout("long-poll exhausted");
        assert!(err.is_transient());
        assert!(!err.is_permanent());
    }

    #[test]
    fn sqlx_error_maps_to_internal() {
        let err: CoordinationError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind, ErrorKind::Internal);
    }
}
