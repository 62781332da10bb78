//! Knowledge directory layout.
//!
//! The knowledge directory is shared with the ML predictor and the geometry
//! host, so every name below is part of the cross-process contract.
//!
//! # Directory Structure
//!
//! ```text
//! knowledge/
//! ├── config.json              # Static configuration
//! ├── design.json              # Current design snapshot
//! ├── geometry_request.json    # Descriptor for the geometry host
//! ├── rhino_geometry.json      # Metrics published by the geometry host
//! ├── ml_output.json           # ML result
//! ├── ml_processed.flag        # Sentinel: ml_output has gated a transition
//! ├── model.json               # Regressor artifact (configurable)
//! └── iterations/
//!     ├── V0.json
//!     └── V1.json
//! ```

use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";
pub const DESIGN_FILE: &str = "design.json";
pub const GEOMETRY_REQUEST_FILE: &str = "geometry_request.json";
pub const HOST_GEOMETRY_FILE: &str = "rhino_geometry.json";
pub const ML_OUTPUT_FILE: &str = "ml_output.json";
pub const PROCESSED_FLAG_FILE: &str = "ml_processed.flag";
pub const ITERATIONS_DIR: &str = "iterations";

/// Default knowledge directory, relative to the working directory.
pub const DEFAULT_KNOWLEDGE_DIR: &str = "knowledge";

/// Resolves every well-known file under one knowledge root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgePaths {
    root: PathBuf,
}

impl KnowledgePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn design_file(&self) -> PathBuf {
        self.root.join(DESIGN_FILE)
    }

    pub fn geometry_request_file(&self) -> PathBuf {
        self.root.join(GEOMETRY_REQUEST_FILE)
    }

    pub fn host_geometry_file(&self) -> PathBuf {
        self.root.join(HOST_GEOMETRY_FILE)
    }

    pub fn ml_output_file(&self) -> PathBuf {
        self.root.join(ML_OUTPUT_FILE)
    }

    pub fn processed_flag_file(&self) -> PathBuf {
        self.root.join(PROCESSED_FLAG_FILE)
    }

    pub fn iterations_dir(&self) -> PathBuf {
        self.root.join(ITERATIONS_DIR)
    }

    /// Resolves a configured path: absolute paths are kept, relative ones
    /// are taken from the knowledge root.
    pub fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Whether `path` is the ML output file of this root.
    pub fn is_ml_output(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|name| name == ML_OUTPUT_FILE)
            && path.parent().is_some_and(|parent| parent == self.root)
    }

    /// Creates the knowledge root and the iterations directory.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.iterations_dir())
    }
}

impl Default for KnowledgePaths {
    fn default() -> Self {
        Self::new(DEFAULT_KNOWLEDGE_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted() {
        let paths = KnowledgePaths::new("/tmp/k");
        assert_eq!(paths.ml_output_file(), PathBuf::from("/tmp/k/ml_output.json"));
        assert_eq!(
            paths.processed_flag_file(),
            PathBuf::from("/tmp/k/ml_processed.flag")
        );
        assert_eq!(paths.iterations_dir(), PathBuf::from("/tmp/k/iterations"));
    }

    #[test]
    fn relative_config_paths_resolve_under_root() {
        let paths = KnowledgePaths::new("/tmp/k");
        assert_eq!(paths.resolve("model.json"), PathBuf::from("/tmp/k/model.json"));
        assert_eq!(paths.resolve("/opt/m.json"), PathBuf::from("/opt/m.json"));
    }

    #[test]
    fn ml_output_detection() {
        let paths = KnowledgePaths::new("/tmp/k");
        assert!(paths.is_ml_output(Path::new("/tmp/k/ml_output.json")));
        assert!(!paths.is_ml_output(Path::new("/tmp/k/iterations/ml_output.json")));
        assert!(!paths.is_ml_output(Path::new("/tmp/k/design.json")));
    }
}
