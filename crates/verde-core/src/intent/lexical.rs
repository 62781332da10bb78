use super::{Intent, IntentRouter};
use async_trait::async_trait;

/// Keyword table in precedence order; the first intent with a matching
/// keyword wins.
const KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::CarbonQuery,
        &["carbon", "embodied", "gwp", "environmental", "emissions"],
    ),
    (
        Intent::ImprovementSuggestion,
        &[
            "improve", "optimize", "reduce", "better", "recommend", "minimize", "maximize",
        ],
    ),
    (
        Intent::DesignChange,
        &[
            "change", "replace", "update", "modify", "set", "switch", "turn into",
        ],
    ),
    (
        Intent::DataQuery,
        &["what", "how much", "how many", "show", "display", "list"],
    ),
];

/// Case-insensitive substring classification.
pub fn classify_lexical(utterance: &str) -> Intent {
    let lowered = utterance.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lowered.contains(w)))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::GeneralQuery)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalIntentRouter;

#[async_trait]
impl IntentRouter for LexicalIntentRouter {
    async fn classify(&self, utterance: &str) -> Intent {
        classify_lexical(utterance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_map_to_intents() {
        assert_eq!(classify_lexical("What is the GWP?"), Intent::CarbonQuery);
        assert_eq!(
            classify_lexical("Can you recommend something?"),
            Intent::ImprovementSuggestion
        );
        assert_eq!(
            classify_lexical("Switch the roof insulation to cork"),
            Intent::DesignChange
        );
        assert_eq!(classify_lexical("Show me the heating demand"), Intent::DataQuery);
        assert_eq!(classify_lexical("Thanks!"), Intent::GeneralQuery);
    }

    #[test]
    fn precedence_follows_table_order() {
        // carbon beats reduce
        assert_eq!(
            classify_lexical("How do I reduce embodied impact?"),
            Intent::CarbonQuery
        );
        // improve beats change
        assert_eq!(
            classify_lexical("Which change would improve heating?"),
            Intent::ImprovementSuggestion
        );
        // change beats what
        assert_eq!(
            classify_lexical("What if we change the walls to brick"),
            Intent::DesignChange
        );
    }

    #[test]
    fn empty_input_is_general() {
        assert_eq!(classify_lexical(""), Intent::GeneralQuery);
    }

    #[tokio::test]
    async fn router_wraps_lexical() {
        let router = LexicalIntentRouter;
        assert_eq!(router.classify("list versions").await, Intent::DataQuery);
    }
}
