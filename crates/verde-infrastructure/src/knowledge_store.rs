//! The shared knowledge directory.
//!
//! Writers go through the atomic temp-then-rename path. Readers of files
//! owned by other processes tolerate absent or half-written content: they log
//! and return nothing instead of failing the caller.

use crate::dto::{DesignSnapshot, HostGeometryDto};
use crate::paths::KnowledgePaths;
use crate::storage::{AtomicJsonFile, write_atomic};
use std::fs;
use std::path::PathBuf;
use verde_core::analysis::MlOutput;
use verde_core::design::{DesignData, GeometryMetrics, GeometryRequest};
use verde_core::error::{Result, VerdeError};

#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    paths: KnowledgePaths,
}

impl KnowledgeStore {
    pub fn new(paths: KnowledgePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &KnowledgePaths {
        &self.paths
    }

    pub fn ensure_layout(&self) -> Result<()> {
        self.paths.ensure_dirs()?;
        Ok(())
    }

    // ============================================================================
    // Design snapshot
    // ============================================================================

    pub fn write_design(&self, design: &DesignData) -> Result<()> {
        AtomicJsonFile::new(self.paths.design_file()).save(&DesignSnapshot::capture(design))?;
        Ok(())
    }

    // ============================================================================
    // ML output and the processed flag
    // ============================================================================

    pub fn ml_output_exists(&self) -> bool {
        self.paths.ml_output_file().is_file()
    }

    /// Latest ML result, or `None` when absent or mid-write.
    pub fn read_ml_output(&self) -> Option<MlOutput> {
        self.read_tolerant(AtomicJsonFile::new(self.paths.ml_output_file()))
    }

    pub fn write_ml_output(&self, output: &MlOutput) -> Result<()> {
        AtomicJsonFile::new(self.paths.ml_output_file()).save(output)?;
        Ok(())
    }

    pub fn processed_flag_exists(&self) -> bool {
        self.paths.processed_flag_file().is_file()
    }

    /// Creates the sentinel; its content is the current epoch seconds.
    pub fn create_processed_flag(&self) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        write_atomic(&self.paths.processed_flag_file(), now.to_string().as_bytes())?;
        Ok(now)
    }

    /// Whether `ml_output.json` was written at or after the processed flag.
    /// True when either file is missing or has no modification time.
    pub fn ml_output_is_newer(&self) -> bool {
        let modified = |path: PathBuf| fs::metadata(path).and_then(|m| m.modified()).ok();
        match (
            modified(self.paths.ml_output_file()),
            modified(self.paths.processed_flag_file()),
        ) {
            (Some(output), Some(flag)) => output >= flag,
            _ => true,
        }
    }

    /// Removes the sentinel. Returns whether it existed.
    pub fn remove_processed_flag(&self) -> Result<bool> {
        match fs::remove_file(self.paths.processed_flag_file()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // ============================================================================
    // Geometry host
    // ============================================================================

    /// Metrics the host published, or a `HostSync` error when the file is
    /// missing, malformed or holds non-positive values.
    pub fn read_host_geometry(&self) -> Result<GeometryMetrics> {
        let path = self.paths.host_geometry_file();
        let dto = AtomicJsonFile::<HostGeometryDto>::new(path.clone())
            .load()
            .map_err(|e| VerdeError::host_sync(format!("{}: {}", path.display(), e)))?
            .ok_or_else(|| VerdeError::host_sync(format!("{} not found", path.display())))?;
        let metrics = GeometryMetrics::from(dto);
        if !metrics.is_valid() {
            return Err(VerdeError::host_sync(format!(
                "{} holds invalid metrics (gfa={}, av={})",
                path.display(),
                metrics.gfa,
                metrics.av
            )));
        }
        Ok(metrics)
    }

    pub fn write_geometry_request(&self, request: &GeometryRequest) -> Result<()> {
        AtomicJsonFile::new(self.paths.geometry_request_file()).save(request)?;
        tracing::info!(
            "[KnowledgeStore] Geometry request written: {} {}x{}x{}",
            request.typology,
            request.voxels_x,
            request.voxels_y,
            request.number_of_levels
        );
        Ok(())
    }

    fn read_tolerant<T>(&self, file: AtomicJsonFile<T>) -> Option<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        match file.load() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    "[KnowledgeStore] Ignoring unreadable {}: {}",
                    file.path().display(),
                    e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use verde_core::design::Typology;

    fn store() -> (KnowledgeStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = KnowledgeStore::new(KnowledgePaths::new(temp_dir.path()));
        store.ensure_layout().unwrap();
        (store, temp_dir)
    }

    #[test]
    fn flag_lifecycle() {
        let (store, _dir) = store();
        assert!(!store.processed_flag_exists());
        assert!(!store.remove_processed_flag().unwrap());

        let stamp = store.create_processed_flag().unwrap();
        assert!(store.processed_flag_exists());
        let content = fs::read_to_string(store.paths().processed_flag_file()).unwrap();
        assert_eq!(content, stamp.to_string());

        assert!(store.remove_processed_flag().unwrap());
        assert!(!store.processed_flag_exists());
    }

    #[test]
    fn output_written_before_the_flag_is_not_newer() {
        let (store, _dir) = store();
        assert!(store.ml_output_is_newer());
        store
            .write_ml_output(&MlOutput::from_prediction(&[1.0; 7]))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        store.create_processed_flag().unwrap();
        assert!(!store.ml_output_is_newer());

        std::thread::sleep(std::time::Duration::from_millis(50));
        store
            .write_ml_output(&MlOutput::from_prediction(&[2.0; 7]))
            .unwrap();
        assert!(store.ml_output_is_newer());
    }

    #[test]
    fn half_written_ml_output_reads_as_none() {
        let (store, _dir) = store();
        fs::write(store.paths().ml_output_file(), r#"{"carbon": {"GWP"#).unwrap();
        assert!(store.ml_output_exists());
        assert!(store.read_ml_output().is_none());
    }

    #[test]
    fn ml_output_round_trip() {
        let (store, _dir) = store();
        let output = MlOutput::from_prediction(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        store.write_ml_output(&output).unwrap();
        assert_eq!(store.read_ml_output(), Some(output));
    }

    #[test]
    fn host_geometry_errors_are_host_sync() {
        let (store, _dir) = store();
        assert!(matches!(
            store.read_host_geometry(),
            Err(VerdeError::HostSync(_))
        ));

        fs::write(store.paths().host_geometry_file(), "not json").unwrap();
        assert!(matches!(
            store.read_host_geometry(),
            Err(VerdeError::HostSync(_))
        ));

        fs::write(store.paths().host_geometry_file(), r#"{"gfa": 0, "av": 0.4}"#).unwrap();
        assert!(matches!(
            store.read_host_geometry(),
            Err(VerdeError::HostSync(_))
        ));

        fs::write(store.paths().host_geometry_file(), r#"{"gfa": 720, "av": 0.38}"#).unwrap();
        assert_eq!(
            store.read_host_geometry().unwrap(),
            GeometryMetrics::new(720.0, 0.38)
        );
    }

    #[test]
    fn geometry_request_is_written() {
        let (store, _dir) = store();
        let request = GeometryRequest {
            typology: Typology::LShape,
            voxels_x: 5,
            voxels_y: 4,
            number_of_levels: 3,
            source: "verde".to_string(),
        };
        store.write_geometry_request(&request).unwrap();
        let raw = fs::read_to_string(store.paths().geometry_request_file()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["typology"], "l-shape");
        assert_eq!(value["voxels_x"], 5);
        assert_eq!(value["source"], "verde");
    }

    #[test]
    fn design_snapshot_round_trip() {
        let (store, _dir) = store();
        let mut design = DesignData::new();
        design.apply_simple_material("brick");
        store.write_design(&design).unwrap();
        let raw = fs::read_to_string(store.paths().design_file()).unwrap();
        let snapshot: DesignSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(snapshot.design_data, design);
        assert!(snapshot.inputs.is_none());
    }
}
