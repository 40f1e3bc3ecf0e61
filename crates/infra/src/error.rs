//! Request-level error taxonomy of the access engine.

use thiserror::Error;

use deskhive_auth::{AuthzError, PasswordError, TokenError};
use deskhive_core::DomainError;

use crate::store::StoreError;

pub type AccessResult<T> = Result<T, AccessError>;

/// Every failure is terminal for the request.
///
/// `Unauthenticated` carries no detail: callers never learn why a credential
/// was refused. `Forbidden` covers both "outside scope" and "does not exist"
/// for organization ids taken from the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AccessError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Stable machine-readable code for transports.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::Unauthenticated => "unauthorized",
            AccessError::Forbidden(_) => "forbidden",
            AccessError::NotFound(_) => "not_found",
            AccessError::Conflict(_) => "conflict",
            AccessError::Validation(_) => "validation_error",
            AccessError::InvariantViolation(_) => "invariant_violation",
            AccessError::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AccessError::NotFound(msg),
            StoreError::Conflict(msg) => AccessError::Conflict(msg),
            StoreError::Backend(msg) => {
                tracing::error!(error = %msg, "directory store failure");
                AccessError::Internal(msg)
            }
        }
    }
}

impl From<DomainError> for AccessError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => AccessError::Validation(msg),
            DomainError::InvariantViolation(msg) => AccessError::InvariantViolation(msg),
        }
    }
}

impl From<AuthzError> for AccessError {
    fn from(err: AuthzError) -> Self {
        tracing::debug!(reason = %err, "authorization denied");
        AccessError::Forbidden(err.to_string())
    }
}

impl From<TokenError> for AccessError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => AccessError::Internal(msg),
            other => {
                tracing::debug!(reason = %other, "session token rejected");
                AccessError::Unauthenticated
            }
        }
    }
}

impl From<PasswordError> for AccessError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Empty => AccessError::Validation(err.to_string()),
            PasswordError::Hashing(msg) => AccessError::Internal(msg),
        }
    }
}
