//! Static configuration model (`knowledge/config.json`).

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub extractor: ExtractorKind,
    pub intent_router: IntentRouterKind,
    pub semantic_threshold: f32,
    pub watcher: WatcherConfig,
    pub predictor: PredictorConfig,
    pub host_defaults: HostDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            extractor: ExtractorKind::default(),
            intent_router: IntentRouterKind::default(),
            semantic_threshold: crate::intent::DEFAULT_SIMILARITY_THRESHOLD,
            watcher: WatcherConfig::default(),
            predictor: PredictorConfig::default(),
            host_defaults: HostDefaults::default(),
        }
    }
}

/// Which endpoint the oracle talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LlmMode {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub mode: LlmMode,
    pub local: EndpointConfig,
    pub remote: EndpointConfig,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            mode: LlmMode::Local,
            local: EndpointConfig {
                base_url: "http://localhost:1234/v1".to_string(),
                model: "local-model".to_string(),
                api_key: None,
                embedding_model: None,
            },
            remote: EndpointConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
                api_key: None,
                embedding_model: Some("text-embedding-3-small".to_string()),
            },
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    /// The endpoint selected by `mode`.
    pub fn endpoint(&self) -> &EndpointConfig {
        match self.mode {
            LlmMode::Local => &self.local,
            LlmMode::Remote => &self.remote,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    #[default]
    Oracle,
    Lexical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentRouterKind {
    #[default]
    Lexical,
    Semantic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            debounce_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Path of the regressor artifact, relative to the knowledge directory
    pub artifact: String,
    /// Run the predictor in-process as soon as Phase 1 completes
    pub auto_predict: bool,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            artifact: "model.json".to_string(),
            auto_predict: false,
        }
    }
}

/// Fallback geometry metrics when the host result is unusable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HostDefaults {
    pub gfa: f64,
    pub av: f64,
}

impl Default for HostDefaults {
    fn default() -> Self {
        Self { gfa: 200.0, av: 0.5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.llm.mode, LlmMode::Local);
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.extractor, ExtractorKind::Oracle);
        assert!(config.watcher.enabled);
        assert_eq!(config.watcher.debounce_ms, 2000);
        assert_eq!(config.host_defaults.gfa, 200.0);
        assert!((config.semantic_threshold - 0.7).abs() < 1e-6);
    }

    #[test]
    fn mode_selects_endpoint() {
        let config: AppConfig =
            serde_json::from_str(r#"{"llm":{"mode":"remote"}}"#).unwrap();
        assert_eq!(config.llm.endpoint().model, "gpt-4o");
        assert_eq!(config.llm.local.model, "local-model");
    }
}
