//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure of the authentication core is one of these variants. The HTTP
/// boundary maps each variant to exactly one status code; messages carried here
/// are safe to show to callers, except for `StoreUnavailable`, whose detail is
/// logged and replaced with a generic message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input, unknown role, or a failed precondition
    /// (e.g. no employee record for the email).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Bad credentials or an invalid, expired, or reused token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The record already exists (duplicate email).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing store could not be reached or returned something unexpected.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// The caller-safe message for this error.
    pub fn public_message(&self) -> &str {
        match self {
            DomainError::Validation(m)
            | DomainError::Authentication(m)
            | DomainError::Conflict(m) => m,
            DomainError::StoreUnavailable(_) => "internal server error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_details_are_not_public() {
        let err = DomainError::store_unavailable("connection refused: 10.0.0.3:5432");
        assert_eq!(err.public_message(), "internal server error");
        assert!(err.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn other_variants_expose_their_message() {
        let err = DomainError::authentication("invalid credentials");
        assert_eq!(err.public_message(), "invalid credentials");
    }
}
