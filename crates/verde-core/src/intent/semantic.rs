use super::lexical::classify_lexical;
use super::{Intent, IntentRouter};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Similarity an exemplar must exceed before the semantic match is trusted.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Text embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds each input text; the output has one vector per input.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

const EXEMPLARS: &[(Intent, &[&str])] = &[
    (
        Intent::CarbonQuery,
        &[
            "How much embodied carbon does this design have?",
            "What is the global warming potential of the building?",
            "Tell me about the environmental impact",
        ],
    ),
    (
        Intent::ImprovementSuggestion,
        &[
            "How can I make this design perform better?",
            "Suggest ways to lower the energy demand",
            "Which material would you recommend instead?",
        ],
    ),
    (
        Intent::DesignChange,
        &[
            "Use brick for the exterior walls instead",
            "Make the window ratio forty percent",
            "Swap the roof insulation for cork",
        ],
    ),
    (
        Intent::DataQuery,
        &[
            "What is the heating demand?",
            "Show me the results of the last version",
            "How many versions have we tried?",
        ],
    ),
];

/// Embedding-similarity router with lexical fallback.
///
/// Exemplar vectors are computed once, on first use.
pub struct SemanticIntentRouter {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    exemplars: OnceCell<Vec<(Intent, Vec<f32>)>>,
}

impl SemanticIntentRouter {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_threshold(embedder, DEFAULT_SIMILARITY_THRESHOLD)
    }

    pub fn with_threshold(embedder: Arc<dyn Embedder>, threshold: f32) -> Self {
        Self {
            embedder,
            threshold,
            exemplars: OnceCell::new(),
        }
    }

    async fn exemplars(&self) -> Result<&Vec<(Intent, Vec<f32>)>> {
        self.exemplars
            .get_or_try_init(|| async {
                let labelled: Vec<(Intent, String)> = EXEMPLARS
                    .iter()
                    .flat_map(|(intent, texts)| texts.iter().map(move |t| (*intent, t.to_string())))
                    .collect();
                let texts: Vec<String> = labelled.iter().map(|(_, t)| t.clone()).collect();
                let vectors = self.embedder.embed(&texts).await?;
                Ok(labelled
                    .into_iter()
                    .map(|(intent, _)| intent)
                    .zip(vectors)
                    .collect())
            })
            .await
    }

    /// Best exemplar match and its score, if embedding succeeded.
    pub async fn best_match(&self, utterance: &str) -> Result<Option<(Intent, f32)>> {
        let exemplars = self.exemplars().await?;
        let query = self.embedder.embed(&[utterance.to_string()]).await?;
        let Some(query) = query.first() else {
            return Ok(None);
        };
        Ok(exemplars
            .iter()
            .map(|(intent, vector)| (*intent, cosine_similarity(query, vector)))
            .max_by(|a, b| a.1.total_cmp(&b.1)))
    }
}

#[async_trait]
impl IntentRouter for SemanticIntentRouter {
    async fn classify(&self, utterance: &str) -> Intent {
        match self.best_match(utterance).await {
            Ok(Some((intent, score))) if score > self.threshold => {
                tracing::debug!("[IntentRouter] semantic match {} ({:.3})", intent, score);
                intent
            }
            Ok(_) => classify_lexical(utterance),
            Err(e) => {
                tracing::warn!("[IntentRouter] embedding failed, using lexical: {}", e);
                classify_lexical(utterance)
            }
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VerdeError;

    /// Embeds by counting a handful of marker words.
    struct BagOfWords;

    #[async_trait]
    impl Embedder for BagOfWords {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let markers = ["carbon", "better", "brick", "heating", "swap", "instead"];
            Ok(texts
                .iter()
                .map(|t| {
                    let lowered = t.to_lowercase();
                    markers
                        .iter()
                        .map(|m| if lowered.contains(m) { 1.0 } else { 0.0 })
                        .collect()
                })
                .collect())
        }
    }

    struct Offline;

    #[async_trait]
    impl Embedder for Offline {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(VerdeError::oracle_unavailable("no endpoint"))
        }
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn strong_semantic_match_wins() {
        let router = SemanticIntentRouter::new(Arc::new(BagOfWords));
        // no lexical keyword at all, but matches "Use brick ... instead"
        assert_eq!(
            router.classify("brick walls instead").await,
            Intent::DesignChange
        );
    }

    #[tokio::test]
    async fn weak_match_falls_back_to_lexical() {
        let router = SemanticIntentRouter::new(Arc::new(BagOfWords));
        assert_eq!(router.classify("list the versions").await, Intent::DataQuery);
    }

    #[tokio::test]
    async fn embedder_failure_falls_back_to_lexical() {
        let router = SemanticIntentRouter::new(Arc::new(Offline));
        assert_eq!(router.classify("show the gwp").await, Intent::CarbonQuery);
    }
}
