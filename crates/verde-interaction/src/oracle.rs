//! Chat-completion oracle seam.

use async_trait::async_trait;
use thiserror::Error;
use verde_core::error::VerdeError;

/// Failures talking to the LLM endpoint.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OracleError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("response had no content")]
    Empty,
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl From<OracleError> for VerdeError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Timeout { secs } => VerdeError::OracleTimeout { secs },
            other => VerdeError::oracle_unavailable(other.to_string()),
        }
    }
}

/// System prompt plus user prompt in, assistant text out.
#[async_trait]
pub trait ChatOracle: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_keeps_its_own_variant() {
        assert_eq!(
            VerdeError::from(OracleError::Timeout { secs: 30 }),
            VerdeError::OracleTimeout { secs: 30 }
        );
        assert!(matches!(
            VerdeError::from(OracleError::Empty),
            VerdeError::OracleUnavailable(_)
        ));
    }
}
