pub mod config_service;
pub mod dto;
pub mod json_version_repository;
pub mod knowledge_store;
pub mod paths;
pub mod regressor;
pub mod storage;
pub mod watcher;

pub use crate::config_service::ConfigService;
pub use crate::json_version_repository::JsonVersionRepository;
pub use crate::knowledge_store::KnowledgeStore;
pub use crate::paths::KnowledgePaths;
pub use crate::regressor::JsonRegressor;
pub use crate::watcher::{Debouncer, FileEvent, FileEventKind, KnowledgeWatcher};
