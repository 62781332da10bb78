//! Phase-2 intent routing.
//!
//! Every analysis-phase utterance is classified into exactly one [`Intent`].
//! The lexical router is the reference; the semantic router is a drop-in
//! that falls back to it below its similarity threshold.

mod lexical;
mod semantic;

pub use lexical::{LexicalIntentRouter, classify_lexical};
pub use semantic::{DEFAULT_SIMILARITY_THRESHOLD, Embedder, SemanticIntentRouter, cosine_similarity};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Phase-2 intent tags. There is no `unknown`: `GeneralQuery` is the fallback.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Intent {
    CarbonQuery,
    ImprovementSuggestion,
    DesignChange,
    DataQuery,
    GeneralQuery,
}

/// Which responder handles an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResponderKind {
    DataAnswer,
    Advisor,
    ChangeParser,
}

impl Intent {
    pub fn responder(self) -> ResponderKind {
        match self {
            Self::ImprovementSuggestion => ResponderKind::Advisor,
            Self::DesignChange => ResponderKind::ChangeParser,
            Self::CarbonQuery | Self::DataQuery | Self::GeneralQuery => ResponderKind::DataAnswer,
        }
    }
}

/// Classifies an analysis-phase utterance.
#[async_trait]
pub trait IntentRouter: Send + Sync {
    async fn classify(&self, utterance: &str) -> Intent;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_table() {
        assert_eq!(Intent::CarbonQuery.responder(), ResponderKind::DataAnswer);
        assert_eq!(Intent::DataQuery.responder(), ResponderKind::DataAnswer);
        assert_eq!(Intent::GeneralQuery.responder(), ResponderKind::DataAnswer);
        assert_eq!(
            Intent::ImprovementSuggestion.responder(),
            ResponderKind::Advisor
        );
        assert_eq!(Intent::DesignChange.responder(), ResponderKind::ChangeParser);
    }
}
