//! Prediction service: design data in, ML output and a new version out.

use std::sync::Arc;
use verde_core::analysis::MlOutput;
use verde_core::config::HostDefaults;
use verde_core::design::{DesignData, GeometryMetrics, ParameterSet};
use verde_core::error::{Result, VerdeError};
use verde_core::predictor::Predictor;
use verde_core::version::{PredictionOutcome, VersionId, VersionRepository};
use verde_infrastructure::KnowledgeStore;

/// Where the geometry metrics of a prediction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsSource {
    /// Already on the design data
    Design,
    /// `rhino_geometry.json`
    Host,
    /// Estimated from the voxel grid
    Synthesized,
    /// Configured fallback values
    Defaults,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionReport {
    pub version: VersionId,
    pub inputs: ParameterSet,
    pub outcome: PredictionOutcome,
    pub metrics_source: MetricsSource,
}

pub struct PredictionService {
    store: KnowledgeStore,
    versions: Arc<dyn VersionRepository>,
    predictor: Option<Arc<dyn Predictor>>,
    host_defaults: HostDefaults,
}

impl PredictionService {
    pub fn new(
        store: KnowledgeStore,
        versions: Arc<dyn VersionRepository>,
        predictor: Option<Arc<dyn Predictor>>,
        host_defaults: HostDefaults,
    ) -> Self {
        Self {
            store,
            versions,
            predictor,
            host_defaults,
        }
    }

    /// GFA and compactness for a design that has none yet.
    ///
    /// The host result wins; generated designs fall back to synthesis, and
    /// everything else to the configured defaults.
    pub fn resolve_host_metrics(&self, design: &DesignData) -> (GeometryMetrics, MetricsSource) {
        match self.store.read_host_geometry() {
            Ok(metrics) => return (metrics, MetricsSource::Host),
            Err(e) => {
                if design.self_modeling == Some(false) {
                    if let Some(metrics) = design.geometry.synthesize_metrics() {
                        tracing::debug!("[Prediction] No host geometry ({}), synthesized", e);
                        return (metrics, MetricsSource::Synthesized);
                    }
                }
                tracing::warn!(
                    "[Prediction] {}; using defaults gfa={} av={}",
                    e,
                    self.host_defaults.gfa,
                    self.host_defaults.av
                );
            }
        }
        (
            GeometryMetrics::new(self.host_defaults.gfa, self.host_defaults.av),
            MetricsSource::Defaults,
        )
    }

    /// Predicts `design`, publishes the ML output and records a version.
    ///
    /// Host metrics are resolved into `design` first when missing. A
    /// predictor failure is recorded as a failed version, not an error.
    pub async fn run(&self, design: &mut DesignData) -> Result<PredictionReport> {
        let metrics_source = if design.has_host_metrics() {
            MetricsSource::Design
        } else {
            let (metrics, source) = self.resolve_host_metrics(design);
            design.apply_metrics(metrics);
            source
        };
        let inputs = design.parameter_set()?;

        let outcome = match self.predict(inputs).await {
            Ok(values) => {
                self.store.write_ml_output(&MlOutput::from_prediction(&values))?;
                self.store.remove_processed_flag()?;
                PredictionOutcome::from_values(&values)
            }
            Err(e) => {
                tracing::warn!("[Prediction] {}", e);
                PredictionOutcome::failed()
            }
        };

        let version = self.versions.save(inputs, outcome.clone()).await?;
        Ok(PredictionReport {
            version,
            inputs,
            outcome,
            metrics_source,
        })
    }

    async fn predict(&self, inputs: ParameterSet) -> Result<[f64; 7]> {
        let predictor = self
            .predictor
            .clone()
            .ok_or_else(|| VerdeError::predictor("no regressor artifact loaded"))?;
        tokio::task::spawn_blocking(move || predictor.predict_parameters(&inputs))
            .await
            .map_err(|e| VerdeError::predictor(format!("predict task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use verde_core::analysis::Metric;
    use verde_core::design::{DesignUpdate, Geometry, Typology};
    use verde_infrastructure::{JsonVersionRepository, KnowledgePaths};

    /// Sums the inputs into every output.
    struct Summing;

    impl Predictor for Summing {
        fn predict(&self, inputs: &[f64; 10]) -> Result<[f64; 7]> {
            Ok([inputs.iter().sum(); 7])
        }
    }

    struct Broken;

    impl Predictor for Broken {
        fn predict(&self, _inputs: &[f64; 10]) -> Result<[f64; 7]> {
            Err(VerdeError::predictor("artifact corrupt"))
        }
    }

    fn service(dir: &TempDir, predictor: Option<Arc<dyn Predictor>>) -> PredictionService {
        let paths = KnowledgePaths::new(dir.path());
        let store = KnowledgeStore::new(paths.clone());
        store.ensure_layout().unwrap();
        let versions = Arc::new(JsonVersionRepository::new(paths.iterations_dir()));
        PredictionService::new(store, versions, predictor, HostDefaults::default())
    }

    fn design(self_modeling: bool) -> DesignData {
        let mut design = DesignData::new();
        design.geometry = Geometry {
            typology: Some(Typology::Block),
            number_of_levels: Some(4),
            width_m: Some(15.0),
            depth_m: Some(15.0),
        };
        design.self_modeling = Some(self_modeling);
        design.apply_simple_material("wood");
        design.wwr = Some(0.3);
        design
    }

    #[tokio::test]
    async fn generated_design_is_synthesized() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Some(Arc::new(Summing)));
        let mut design = design(false);

        let report = service.run(&mut design).await.unwrap();
        assert_eq!(report.metrics_source, MetricsSource::Synthesized);
        assert_eq!(report.version, VersionId(0));
        assert_eq!(design.gfa, Some(900.0));
        assert!(dir.path().join("ml_output.json").is_file());
        assert!(report.outcome.metric(Metric::GwpTotal).is_some());
    }

    #[tokio::test]
    async fn host_file_is_preferred() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("rhino_geometry.json"), r#"{"GFA": 640.0, "av": 0.61}"#)
            .unwrap();
        let service = service(&dir, Some(Arc::new(Summing)));
        let mut design = design(true);

        let report = service.run(&mut design).await.unwrap();
        assert_eq!(report.metrics_source, MetricsSource::Host);
        assert_eq!(report.inputs.gfa, 640.0);
    }

    #[tokio::test]
    async fn missing_host_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Some(Arc::new(Summing)));
        let mut design = design(true);

        let report = service.run(&mut design).await.unwrap();
        assert_eq!(report.metrics_source, MetricsSource::Defaults);
        assert_eq!(design.gfa, Some(200.0));
        assert_eq!(design.av, Some(0.5));
    }

    #[tokio::test]
    async fn massing_change_resolves_metrics_again() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Some(Arc::new(Summing)));
        let mut design = design(true);
        service.run(&mut design).await.unwrap();
        assert_eq!(design.gfa, Some(200.0));

        std::fs::write(dir.path().join("rhino_geometry.json"), r#"{"gfa": 1800.0, "av": 0.39}"#)
            .unwrap();
        let taller = DesignUpdate {
            number_of_levels: Some(8),
            ..Default::default()
        };
        design.merge(&taller).unwrap();

        let report = service.run(&mut design).await.unwrap();
        assert_eq!(report.metrics_source, MetricsSource::Host);
        assert_eq!(report.inputs.gfa, 1800.0);
        assert_eq!(report.version, VersionId(1));
    }

    #[tokio::test]
    async fn predictor_failure_is_recorded() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Some(Arc::new(Broken)));
        let mut design = design(false);

        let report = service.run(&mut design).await.unwrap();
        assert!(report.outcome.is_failed());
        assert!(!dir.path().join("ml_output.json").exists());
        assert!(dir.path().join("iterations").join("V0.json").is_file());
    }

    #[tokio::test]
    async fn incomplete_design_is_rejected() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Some(Arc::new(Summing)));
        let mut design = design(false);
        design.wwr = None;
        assert!(matches!(
            service.run(&mut design).await,
            Err(VerdeError::InvariantViolation(_))
        ));
    }
}
