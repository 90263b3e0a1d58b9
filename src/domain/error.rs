//! Crate-wide error type for the coordination plane.
//!
//! A single flat enum carrying the machine-readable kinds the core
//! surfaces per the error handling design: no exception crosses a module
//! boundary without one of these codes attached.

use thiserror::Error;

/// Errors surfaced by the coordination plane.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("lease held: {0}")]
    LeaseHeld(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("transaction error: {0}")]
    TransactionError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl SwarmError {
    /// Stable machine-readable code, as required by the error handling design.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::LeaseHeld(_) => "lease_held",
            Self::InvalidState(_) => "invalid_state",
            Self::ConnectionError(_) => "connection_error",
            Self::TransactionError(_) => "transaction_error",
            Self::NetworkError(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::Conflict(_) => "conflict",
            Self::Fatal(_) => "fatal",
        }
    }

    /// Whether a caller may safely retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionError(_) | Self::TransactionError(_) | Self::NetworkError(_) | Self::Timeout(_))
    }
}

impl From<sqlx::Error> for SwarmError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound(err.to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                Self::AlreadyExists(db_err.to_string())
            }
            sqlx::Error::Database(ref db_err) => Self::ConstraintViolation(db_err.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => Self::ConnectionError(err.to_string()),
            _ => Self::TransactionError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SwarmError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConstraintViolation(format!("serialization error: {err}"))
    }
}

impl From<reqwest::Error> for SwarmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::NetworkError(err.to_string())
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for SwarmError {
    fn from(err: chrono::ParseError) -> Self {
        Self::ConstraintViolation(format!("timestamp parse error: {err}"))
    }
}

pub type SwarmResult<T> = Result<T, SwarmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(SwarmError::ConnectionError("x".into()).is_retryable());
        assert!(SwarmError::TransactionError("x".into()).is_retryable());
        assert!(SwarmError::NetworkError("x".into()).is_retryable());
        assert!(SwarmError::Timeout("x".into()).is_retryable());
        assert!(!SwarmError::NotFound("x".into()).is_retryable());
        assert!(!SwarmError::Fatal("x".into()).is_retryable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(SwarmError::NotFound("x".into()).code(), "not_found");
        assert_eq!(SwarmError::LeaseHeld("x".into()).code(), "lease_held");
        assert_eq!(SwarmError::Conflict("x".into()).code(), "conflict");
    }
}
