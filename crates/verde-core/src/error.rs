//! Error types for the Verde application.

use serde::Serialize;
use thiserror::Error;

/// A shared error type for the entire Verde application.
///
/// The conversation-facing variants follow the taxonomy the orchestrator
/// recovers from (parse failures, oracle outages, predictor and host sync
/// failures, invariant violations). The remaining variants cover storage and
/// configuration plumbing.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum VerdeError {
    /// Oracle returned non-JSON or an incomplete parameter set
    #[error("Parse error: {0}")]
    Parse(String),

    /// LLM endpoint connection failure or non-success status
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// LLM call exceeded the configured timeout
    #[error("Oracle timed out after {secs}s")]
    OracleTimeout { secs: u64 },

    /// ML artifact missing or predict call failed
    #[error("Predictor error: {0}")]
    Predictor(String),

    /// Expected geometry file missing or malformed
    #[error("Host sync error: {0}")]
    HostSync(String),

    /// A conversation invariant would be broken by the requested operation
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VerdeError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn oracle_unavailable(message: impl Into<String>) -> Self {
        Self::OracleUnavailable(message.into())
    }

    pub fn predictor(message: impl Into<String>) -> Self {
        Self::Predictor(message.into())
    }

    pub fn host_sync(message: impl Into<String>) -> Self {
        Self::HostSync(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Errors after which the conversation stays in its current state
    /// instead of landing in `error`.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Parse(_) | Self::OracleUnavailable(_) | Self::HostSync(_) | Self::Predictor(_)
        )
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for VerdeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for VerdeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, VerdeError>`.
pub type Result<T> = std::result::Result<T, VerdeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_kind() {
        let err: VerdeError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert!(err.to_string().contains("NotFound"));
    }

    #[test]
    fn recoverable_errors_do_not_include_invariants() {
        assert!(VerdeError::parse("bad json").is_recoverable());
        assert!(VerdeError::oracle_unavailable("refused").is_recoverable());
        assert!(!VerdeError::invariant("phase 1").is_recoverable());
        assert!(!VerdeError::OracleTimeout { secs: 30 }.is_recoverable());
    }
}
