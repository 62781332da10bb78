//! Phase-1 parameter extraction.
//!
//! An extractor turns one utterance plus the current design into a partial
//! [`DesignUpdate`]. Merging that update into the design keeps every field
//! the utterance did not mention. Oracle failures are values here, not
//! errors: the state machine decides what each outcome means.

mod lexical;
mod oracle;

pub use lexical::LexicalExtractor;
pub use oracle::OracleExtractor;

use async_trait::async_trait;
use verde_core::design::{DesignData, DesignUpdate};
use verde_core::error::VerdeError;

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Parsed(DesignUpdate),
    /// The oracle answered, but not with a usable parameter object
    ParseError(String),
    /// The oracle could not be reached (`OracleUnavailable` or `OracleTimeout`)
    Unavailable(VerdeError),
}

#[async_trait]
pub trait ParameterExtractor: Send + Sync {
    async fn extract(&self, utterance: &str, current: &DesignData) -> Extraction;
}

/// Strips markdown fences and surrounding prose, leaving the outermost JSON
/// object.
pub(crate) fn json_object_text(content: &str) -> Option<&str> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (start < end).then(|| &trimmed[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_and_wrapped_json() {
        assert_eq!(json_object_text("```json\n{\"a\":1}\n```"), Some("{\"a\":1}"));
        assert_eq!(
            json_object_text("Sure! Here it is: {\"a\": {\"b\": 2}} Hope that helps."),
            Some("{\"a\": {\"b\": 2}}")
        );
        assert_eq!(json_object_text("no json here"), None);
        assert_eq!(json_object_text("} {"), None);
    }
}
