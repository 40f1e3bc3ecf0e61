//! Failures raised while building directory records.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Rejections of malformed input or impossible tree shapes.
///
/// Lookups, uniqueness and authorization are decided by the store and the
/// access engine, not here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Blank names, malformed emails, unknown role or org type names.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The record would break the organization tree, e.g. a child under a CLIENT org.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An id string that does not parse as a UUID.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
