//! Configuration service implementation.
//!
//! Loads [`AppConfig`] from `knowledge/config.json` and caches it. API keys
//! left empty in the file are taken from the environment.

use crate::paths::KnowledgePaths;
use crate::storage::AtomicJsonFile;
use std::sync::{Arc, RwLock};
use verde_core::config::{AppConfig, LlmMode};
use verde_core::error::{Result, VerdeError};

/// Environment variables consulted for the oracle API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["VERDE_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Clone)]
pub struct ConfigService {
    paths: KnowledgePaths,
    config: Arc<RwLock<Option<AppConfig>>>,
}

impl ConfigService {
    pub fn new(paths: KnowledgePaths) -> Self {
        Self {
            paths,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Returns the configuration, loading it on first access.
    ///
    /// A missing file yields defaults; a malformed one is a `Config` error.
    pub fn get_config(&self) -> Result<AppConfig> {
        if let Ok(guard) = self.config.read() {
            if let Some(cached) = guard.as_ref() {
                return Ok(cached.clone());
            }
        }

        let loaded = self.load_config()?;
        if let Ok(mut guard) = self.config.write() {
            *guard = Some(loaded.clone());
        }
        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        if let Ok(mut guard) = self.config.write() {
            *guard = None;
        }
    }

    fn load_config(&self) -> Result<AppConfig> {
        let path = self.paths.config_file();
        let loaded = AtomicJsonFile::<AppConfig>::new(path.clone())
            .load()
            .map_err(|e| VerdeError::config(format!("{}: {}", path.display(), e)))?;
        match loaded {
            Some(config) => {
                tracing::debug!("[ConfigService] Loaded {}", path.display());
                Ok(config)
            }
            None => {
                tracing::debug!("[ConfigService] {} absent, using defaults", path.display());
                Ok(AppConfig::default())
            }
        }
    }

    /// API key for the selected endpoint, falling back to the environment.
    pub fn api_key(config: &AppConfig) -> Option<String> {
        Self::api_key_with(config, |name| std::env::var(name).ok())
    }

    /// Same as [`ConfigService::api_key`] with an explicit variable lookup.
    pub fn api_key_with<F>(config: &AppConfig, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        config
            .llm
            .endpoint()
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .filter_map(|name| lookup(name))
                    .find(|key| !key.trim().is_empty())
            })
    }

    /// Remote mode cannot run without a key.
    pub fn check_credentials(config: &AppConfig, api_key: Option<&str>) -> Result<()> {
        if config.llm.mode == LlmMode::Remote && api_key.is_none() {
            return Err(VerdeError::config(format!(
                "remote mode needs an API key (config llm.remote.api_key or {})",
                API_KEY_ENV_VARS.join(" / ")
            )));
        }
        Ok(())
    }
}
