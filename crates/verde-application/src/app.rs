//! Application bootstrap: wires configuration, collaborators and the
//! orchestrator for one knowledge directory.

use crate::machine::ConversationMachine;
use crate::orchestrator::Orchestrator;
use crate::phase_gate::PhaseGate;
use crate::prediction::PredictionService;
use crate::registry::SessionRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use verde_core::config::{AppConfig, ExtractorKind, IntentRouterKind};
use verde_core::error::Result;
use verde_core::intent::{Embedder, IntentRouter, LexicalIntentRouter, SemanticIntentRouter};
use verde_core::predictor::Predictor;
use verde_infrastructure::{
    ConfigService, JsonRegressor, JsonVersionRepository, KnowledgePaths, KnowledgeStore,
    KnowledgeWatcher,
};
use verde_interaction::{
    ChatOracle, LexicalExtractor, OpenAiCompatibleOracle, OracleExtractor, ParameterExtractor,
    PromptLibrary, Responders,
};

/// External collaborators the application may run without.
#[derive(Default, Clone)]
pub struct Collaborators {
    pub chat: Option<Arc<dyn ChatOracle>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub predictor: Option<Arc<dyn Predictor>>,
}

impl Collaborators {
    /// Builds whatever the configuration allows.
    ///
    /// Missing credentials and an unreadable regressor artifact are logged and
    /// leave the slot empty.
    pub fn from_config(paths: &KnowledgePaths, config: &AppConfig) -> Self {
        let mut collaborators = Self::default();

        let api_key = ConfigService::api_key(config);
        match ConfigService::check_credentials(config, api_key.as_deref()) {
            Ok(()) => {
                let oracle = Arc::new(OpenAiCompatibleOracle::from_config(&config.llm, api_key));
                tracing::info!(
                    "[App] Oracle {} at {} ({})",
                    oracle.model(),
                    oracle.base_url(),
                    config.llm.mode
                );
                collaborators.chat = Some(oracle.clone());
                collaborators.embedder = Some(oracle);
            }
            Err(e) => tracing::warn!("[App] {}; running without the oracle", e),
        }

        let artifact = paths.resolve(&config.predictor.artifact);
        match JsonRegressor::load(&artifact) {
            Ok(regressor) => collaborators.predictor = Some(Arc::new(regressor)),
            Err(e) => tracing::warn!("[App] No in-process predictor: {}", e),
        }

        collaborators
    }
}

pub struct VerdeApp {
    config: AppConfig,
    paths: KnowledgePaths,
    orchestrator: Arc<Orchestrator>,
}

impl VerdeApp {
    /// Loads `config.json` from `root` and builds every collaborator it names.
    pub fn from_knowledge_dir(root: impl Into<PathBuf>) -> Result<Self> {
        let paths = KnowledgePaths::new(root);
        KnowledgeStore::new(paths.clone()).ensure_layout()?;
        let config = ConfigService::new(paths.clone()).get_config()?;
        let collaborators = Collaborators::from_config(&paths, &config);
        Self::assemble(paths, config, collaborators)
    }

    pub fn assemble(
        paths: KnowledgePaths,
        config: AppConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let store = KnowledgeStore::new(paths.clone());
        store.ensure_layout()?;
        let prompts = Arc::new(PromptLibrary::new()?);

        let extractor: Arc<dyn ParameterExtractor> = match (&config.extractor, &collaborators.chat) {
            (ExtractorKind::Oracle, Some(chat)) => {
                Arc::new(OracleExtractor::new(chat.clone(), prompts.clone()))
            }
            (ExtractorKind::Oracle, None) => {
                tracing::warn!("[App] Oracle extractor requested without an oracle, using lexical");
                Arc::new(LexicalExtractor::new())
            }
            (ExtractorKind::Lexical, _) => Arc::new(LexicalExtractor::new()),
        };

        let router: Arc<dyn IntentRouter> =
            match (&config.intent_router, &collaborators.embedder) {
                (IntentRouterKind::Semantic, Some(embedder)) => Arc::new(
                    SemanticIntentRouter::with_threshold(embedder.clone(), config.semantic_threshold),
                ),
                _ => Arc::new(LexicalIntentRouter),
            };

        let responders = Arc::new(Responders::new(collaborators.chat.clone(), prompts));
        let machine = ConversationMachine::new(extractor, router, responders)
            .with_oracle_timeout(Duration::from_secs(config.llm.timeout_secs));

        let versions = Arc::new(JsonVersionRepository::new(paths.iterations_dir()));
        let predictions = PredictionService::new(
            store.clone(),
            versions.clone(),
            collaborators.predictor.clone(),
            config.host_defaults,
        );
        let orchestrator = Orchestrator::new(
            machine,
            Arc::new(SessionRegistry::new()),
            PhaseGate::new(store),
            predictions,
            versions,
        )
        .with_auto_predict(config.predictor.auto_predict);

        Ok(Self {
            config,
            paths,
            orchestrator: Arc::new(orchestrator),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn paths(&self) -> &KnowledgePaths {
        &self.paths
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    /// Starts the file watcher and the phase-gate synchronizer.
    ///
    /// Returns no handles when the watcher is disabled.
    pub fn start_background(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        if !self.config.watcher.enabled {
            tracing::info!("[App] Watcher disabled; phase 2 opens on the next turn");
            return Vec::new();
        }
        let watcher = KnowledgeWatcher::from_config(self.paths.root(), &self.config.watcher);
        let (events, watch_handle) = watcher.spawn(cancel.clone());
        let sync_handle = self.orchestrator.synchronizer().spawn(events, cancel);
        vec![watch_handle, sync_handle]
    }
}
