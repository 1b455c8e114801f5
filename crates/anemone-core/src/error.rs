//! Error types for Anemone
//!
//! Explicit error variants with context, using thiserror.

use thiserror::Error;

/// Result type alias for Anemone operations
pub type Result<T> = std::result::Result<T, Error>;

/// Anemone error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Delivery Errors
    // =========================================================================
    #[error("Mailbox full: {path}, depth: {depth}, capacity: {capacity}")]
    MailboxFull {
        path: String,
        depth: usize,
        capacity: usize,
    },

    #[error("Actor stopped: {path}")]
    ActorStopped { path: String },

    #[error("Ask timed out: {path} after {timeout_ms}ms")]
    AskTimeout { path: String, timeout_ms: u64 },

    #[error("Handler failed: {path}, reason: {reason}")]
    HandlerFailure { path: String, reason: String },

    // =========================================================================
    // Spawn Errors
    // =========================================================================
    #[error("Duplicate actor name: {path}")]
    DuplicateName { path: String },

    #[error("Invalid actor name: {name}, reason: {reason}")]
    InvalidActorName { name: String, reason: String },

    // =========================================================================
    // Scheduler Errors
    // =========================================================================
    #[error("Schedule delay too long: {delay_ms}ms exceeds limit of {limit_ms}ms")]
    ScheduleDelayTooLong { delay_ms: u64, limit_ms: u64 },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error("Deserialization failed: {reason}")]
    DeserializationFailed { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an actor stopped error
    pub fn actor_stopped(path: impl Into<String>) -> Self {
        Self::ActorStopped { path: path.into() }
    }

    /// Create a handler failure error
    pub fn handler_failure(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HandlerFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a duplicate name error
    pub fn duplicate_name(path: impl Into<String>) -> Self {
        Self::DuplicateName { path: path.into() }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check if the failure was caused by capacity rather than actor state
    ///
    /// A caller may retry a rejected send later; every other delivery error
    /// is final for the envelope it concerns.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::MailboxFull { .. } | Self::AskTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::actor_stopped("actor://local/worker");
        assert!(err.to_string().contains("actor://local/worker"));

        let err = Error::handler_failure("actor://local/b", "boom");
        assert_eq!(
            err.to_string(),
            "Handler failed: actor://local/b, reason: boom"
        );
    }

    #[test]
    fn test_error_is_retriable() {
        assert!(Error::MailboxFull {
            path: "p".into(),
            depth: 2,
            capacity: 2
        }
        .is_retriable());
        assert!(!Error::actor_stopped("p").is_retriable());
        assert!(!Error::duplicate_name("p").is_retriable());
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: Error = anyhow::anyhow!("bad input").into();
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.to_string(), "bad input");
    }
}
