//! # Domain Errors
//!
//! This module defines the error types used throughout the actor domain.
//! Lookup and storage failures surface to the caller of `get`/`create`/`get_history`
//! unchanged. Failures raised inside an actor method are wrapped in
//! [`DomainError::Business`] after the saga has been rolled back, so the original
//! error is always preserved for the caller.

use std::path::PathBuf;

/// Errors produced by an [`EventStore`](crate::store::EventStore) or the event bus.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),
}

/// Errors raised while loading a [`DomainConfig`](crate::config::DomainConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors that can occur within the domain runtime.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// The actor is absent both locally and on every known node.
    #[error("Actor not found: {actor_type}/{id}")]
    NotFound { actor_type: String, id: String },
    #[error("Actor type not registered: {0}")]
    UnknownType(String),
    #[error("Unknown method {method} on {actor_type}")]
    UnknownMethod { actor_type: String, method: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Missing historical class or failed upgrade transform.
    #[error("Upgrade error: {0}")]
    Upgrade(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// Error returned by an actor method body.
    #[error("Business error: {0}")]
    Business(Box<dyn std::error::Error + Send + Sync>),
    /// The method failed and the saga rollback failed as well.
    #[error("Rollback failed ({rollback}) after: {source}")]
    RollbackFailed {
        source: Box<DomainError>,
        rollback: StorageError,
    },
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    /// Reserved for bounded lock waiting; the pipeline waits without bound.
    #[error("Lock wait timed out on {0}")]
    LockTimeout(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DomainError {
    pub fn not_found(actor_type: impl Into<String>, id: impl Into<String>) -> Self {
        DomainError::NotFound {
            actor_type: actor_type.into(),
            id: id.into(),
        }
    }

    /// Wraps an error raised by an actor method.
    ///
    /// A `DomainError` coming back out of a nested call is passed through as-is
    /// instead of being wrapped twice.
    pub fn business<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(error);
        match boxed.downcast::<DomainError>() {
            Ok(domain) => *domain,
            Err(other) => DomainError::Business(other),
        }
    }

    /// Borrows the original business error as `E`, looking through a failed rollback.
    pub fn business_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            DomainError::Business(inner) => inner.downcast_ref::<E>(),
            DomainError::RollbackFailed { source, .. } => source.business_ref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound { .. })
    }
}

/// Result type using [`DomainError`].
pub type DomainResult<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn test_business_preserves_original_error() {
        let err = DomainError::business(Boom);
        assert!(err.business_ref::<Boom>().is_some());
        assert_eq!(err.to_string(), "Business error: boom");
    }

    #[test]
    fn test_business_does_not_double_wrap_domain_errors() {
        let err = DomainError::business(DomainError::not_found("Counter", "c1"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_rollback_failed_exposes_source() {
        let err = DomainError::RollbackFailed {
            source: Box::new(DomainError::business(Boom)),
            rollback: StorageError::Backend("disk gone".into()),
        };
        assert!(err.business_ref::<Boom>().is_some());
        assert!(err.to_string().contains("disk gone"));
    }
}
