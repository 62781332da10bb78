//! Pre-trained regressor loaded from a JSON artifact.

use serde::Deserialize;
use std::path::Path;
use verde_core::analysis::Metric;
use verde_core::design::FEATURE_ORDER;
use verde_core::error::{Result, VerdeError};
use verde_core::predictor::Predictor;

/// Artifact layout as exported by the training pipeline.
#[derive(Debug, Clone, Deserialize)]
struct RegressorArtifact {
    feature_names: Vec<String>,
    feature_means: Vec<f64>,
    feature_scales: Vec<f64>,
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
    targets: Vec<String>,
}

/// Standardized linear model: `y_k = b_k + Σ_j w_kj (x_j - μ_j) / σ_j`.
///
/// Features and targets are reordered at load time so evaluation always
/// runs in `FEATURE_ORDER` and `Metric` order, whatever the artifact order.
#[derive(Debug, Clone)]
pub struct JsonRegressor {
    means: [f64; 10],
    scales: [f64; 10],
    weights: [[f64; 10]; 7],
    intercepts: [f64; 7],
}

impl JsonRegressor {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VerdeError::predictor(format!("cannot read model {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let artifact: RegressorArtifact = serde_json::from_str(content)
            .map_err(|e| VerdeError::predictor(format!("malformed model artifact: {}", e)))?;
        Self::from_artifact(artifact)
    }

    fn from_artifact(artifact: RegressorArtifact) -> Result<Self> {
        let n = artifact.feature_names.len();
        if n != FEATURE_ORDER.len()
            || artifact.feature_means.len() != n
            || artifact.feature_scales.len() != n
        {
            return Err(VerdeError::predictor(format!(
                "model expects {} features, inputs have {}",
                n,
                FEATURE_ORDER.len()
            )));
        }
        if artifact.targets.len() != 7
            || artifact.intercepts.len() != 7
            || artifact.coefficients.len() != 7
            || artifact.coefficients.iter().any(|row| row.len() != n)
        {
            return Err(VerdeError::predictor(
                "model must have 7 targets with one weight per feature",
            ));
        }

        // column in the artifact for each feature in FEATURE_ORDER
        let mut columns = [0usize; 10];
        for (slot, feature) in columns.iter_mut().zip(FEATURE_ORDER) {
            *slot = artifact
                .feature_names
                .iter()
                .position(|name| name == feature)
                .ok_or_else(|| {
                    VerdeError::predictor(format!("model has no feature '{}'", feature))
                })?;
        }

        // row in the artifact for each metric in output order
        let mut rows = [0usize; 7];
        for (slot, metric) in rows.iter_mut().zip(Metric::all()) {
            *slot = artifact
                .targets
                .iter()
                .position(|t| Metric::from_label(t) == Some(metric))
                .ok_or_else(|| {
                    VerdeError::predictor(format!("model has no target '{}'", metric))
                })?;
        }

        let mut regressor = JsonRegressor {
            means: [0.0; 10],
            scales: [1.0; 10],
            weights: [[0.0; 10]; 7],
            intercepts: [0.0; 7],
        };
        for (j, &col) in columns.iter().enumerate() {
            regressor.means[j] = artifact.feature_means[col];
            let scale = artifact.feature_scales[col];
            // constant features are exported with scale 0
            regressor.scales[j] = if scale.abs() > f64::EPSILON { scale } else { 1.0 };
        }
        for (k, &row) in rows.iter().enumerate() {
            regressor.intercepts[k] = artifact.intercepts[row];
            for (j, &col) in columns.iter().enumerate() {
                regressor.weights[k][j] = artifact.coefficients[row][col];
            }
        }
        Ok(regressor)
    }
}

impl Predictor for JsonRegressor {
    fn predict(&self, inputs: &[f64; 10]) -> Result<[f64; 7]> {
        if inputs.iter().any(|x| !x.is_finite()) {
            return Err(VerdeError::predictor("non-finite model input"));
        }
        let mut standardized = [0.0; 10];
        for (j, z) in standardized.iter_mut().enumerate() {
            *z = (inputs[j] - self.means[j]) / self.scales[j];
        }

        let mut outputs = [0.0; 7];
        for (k, y) in outputs.iter_mut().enumerate() {
            *y = self.intercepts[k]
                + self.weights[k]
                    .iter()
                    .zip(standardized.iter())
                    .map(|(w, z)| w * z)
                    .sum::<f64>();
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// GWP depends only on gfa; everything else is its intercept.
    fn artifact() -> serde_json::Value {
        let mut coefficients = vec![vec![0.0; 10]; 7];
        coefficients[6][9] = 2.0;
        json!({
            "feature_names": FEATURE_ORDER,
            "feature_means": [0, 0, 0, 0, 0, 0, 0, 0, 0, 500.0],
            "feature_scales": [1, 1, 1, 1, 1, 1, 1, 1, 1, 100.0],
            "coefficients": coefficients,
            "intercepts": [90, 10, 40, 12, 300, 250, 560],
            "targets": ["EUI", "Cooling Demand", "Heating Demand", "Operational Carbon",
                        "Embodied Carbon A1-A3", "Embodied Carbon A-D", "GWP total"],
        })
    }

    #[test]
    fn standardized_linear_prediction() {
        let model = JsonRegressor::from_json(&artifact().to_string()).unwrap();
        let out = model
            .predict(&[5.0, 0.0, 5.0, 0.0, 2.0, 2.0, 0.0, 0.3, 0.43, 700.0])
            .unwrap();
        assert_eq!(out[0], 90.0);
        // 560 + 2 * (700 - 500) / 100
        assert!((out[6] - 564.0).abs() < 1e-9);
    }

    #[test]
    fn artifact_order_is_normalized() {
        let mut value = artifact();
        let targets = value["targets"].as_array_mut().unwrap();
        targets.swap(0, 6);
        let intercepts = value["intercepts"].as_array_mut().unwrap();
        intercepts.swap(0, 6);
        let coefficients = value["coefficients"].as_array_mut().unwrap();
        coefficients.swap(0, 6);

        let model = JsonRegressor::from_json(&value.to_string()).unwrap();
        let out = model.predict(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.3, 0.4, 500.0]).unwrap();
        assert_eq!(out[0], 90.0);
        assert_eq!(out[6], 560.0);
    }

    #[test]
    fn dimension_mismatch_is_predictor_error() {
        let mut value = artifact();
        value["intercepts"] = json!([1, 2, 3]);
        assert!(matches!(
            JsonRegressor::from_json(&value.to_string()),
            Err(VerdeError::Predictor(_))
        ));
    }

    #[test]
    fn missing_artifact_is_predictor_error() {
        let err = JsonRegressor::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, VerdeError::Predictor(_)));
    }
}
