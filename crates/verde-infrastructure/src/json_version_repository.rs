//! JSON-file VersionRepository implementation.

use crate::storage::AtomicJsonFile;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use verde_core::design::ParameterSet;
use verde_core::error::{Result, VerdeError};
use verde_core::version::{PredictionOutcome, VersionId, VersionRecord, VersionRepository};

/// One JSON file per version.
///
/// Directory structure:
/// ```text
/// iterations/
/// ├── V0.json
/// ├── V1.json
/// └── V2.json
/// ```
///
/// The next id is always derived from what is on disk, so the store stays
/// dense across process restarts.
pub struct JsonVersionRepository {
    dir: PathBuf,
}

impl JsonVersionRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ids of every `V<n>.json` in the directory, ascending.
    async fn scan_ids(&self) -> Result<Vec<VersionId>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = entry.file_name().to_str().and_then(VersionId::from_file_name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn path_of(&self, id: VersionId) -> PathBuf {
        self.dir.join(id.file_name())
    }

    async fn read_record(&self, id: VersionId) -> Result<VersionRecord> {
        let content = match tokio::fs::read_to_string(self.path_of(id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VerdeError::not_found("version", id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl VersionRepository for JsonVersionRepository {
    async fn save(&self, inputs: ParameterSet, outputs: PredictionOutcome) -> Result<VersionId> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let id = match self.scan_ids().await?.last() {
            Some(last) => last.next()?,
            None => VersionId::default(),
        };
        let record = VersionRecord {
            version: id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            inputs,
            outputs,
        };

        let path = self.path_of(id);
        tokio::task::spawn_blocking(move || AtomicJsonFile::new(path).save_new(&record))
            .await
            .map_err(|e| VerdeError::internal(format!("version write task failed: {}", e)))??;

        tracing::info!("[VersionStore] Saved {}", id);
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<VersionRecord>> {
        let mut records = Vec::new();
        for id in self.scan_ids().await? {
            match self.read_record(id).await {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("[VersionStore] Skipping unreadable {}: {}", id, e),
            }
        }
        Ok(records)
    }

    async fn load(&self, id: VersionId) -> Result<VersionRecord> {
        self.read_record(id).await
    }
}
