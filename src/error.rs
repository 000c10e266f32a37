//! Error taxonomy for the context kernel.
//!
//! | Variant | Class | Meaning |
//! |---------|-------|---------|
//! | `NotFound` | client | A required anchor (node, merger, prompt ancestor) is absent |
//! | `Validation` | client | Bad direction, wrong selector shape, malformed node data |
//! | `Store` | upstream | The graph store or node repository failed; source kept intact |
//! | `Model` | upstream | The summarization model call failed |
//! | `Mirror` | upstream | The repository mirror failed |
//! | `Config` | startup | Settings could not be loaded |
//!
//! Partial-data conditions (e.g. usage for an unknown parallel model) are not
//! errors; they are logged with `warn!` and the operation continues.

use crate::collab::{MirrorError, ModelError};

/// Boxed error from a storage backend, propagated without rewrapping its message.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for kernel operations.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// A required node is absent.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was being looked up (e.g. "node", "prompt ancestor").
        kind: &'static str,
        /// The identifier that was looked up.
        id: String,
    },
    /// Input or stored data failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// Store error.
    #[error("Store error: {0}")]
    Store(#[source] BoxError),
    /// Model invocation error.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    /// Repository mirror error.
    #[error("Repository mirror error: {0}")]
    Mirror(#[from] MirrorError),
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KernelError {
    /// Wrap any store error unchanged.
    pub fn from_store<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store(Box::new(e))
    }

    /// Shorthand for a missing node of the given kind.
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the caller is at fault (4xx-class) rather than a dependency (5xx-class).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Validation(_))
    }
}

/// Result type alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct FakeStoreError;

    #[test]
    fn test_not_found_display() {
        let err = KernelError::not_found("context merger", "m1");
        assert_eq!(err.to_string(), "context merger not found: m1");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_store_error_keeps_source() {
        let err = KernelError::from_store(FakeStoreError);
        assert!(!err.is_client_error());
        let source = std::error::Error::source(&err).expect("source retained");
        assert_eq!(source.to_string(), "connection reset");
    }

    #[test]
    fn test_validation_is_client_error() {
        assert!(KernelError::validation("bad direction").is_client_error());
        assert!(!KernelError::Config("missing".into()).is_client_error());
    }
}
