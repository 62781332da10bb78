//! On-disk shapes of the knowledge files that have no domain type of their
//! own.

use serde::{Deserialize, Serialize};
use verde_core::design::{DesignData, FEATURE_ORDER, GeometryMetrics, ParameterSet};

/// `knowledge/design.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSnapshot {
    pub design_data: DesignData,
    /// Present once every regressor input is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<ParameterSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_vector: Option<Vec<f64>>,
    #[serde(default)]
    pub feature_order: Vec<String>,
    /// ISO 8601
    pub updated_at: String,
}

impl DesignSnapshot {
    pub fn capture(design: &DesignData) -> Self {
        let inputs = design.parameter_set().ok();
        Self {
            design_data: design.clone(),
            input_vector: inputs.map(|p| p.to_vector().to_vec()),
            inputs,
            feature_order: FEATURE_ORDER.iter().map(|f| f.to_string()).collect(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// `knowledge/rhino_geometry.json` as the host writes it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HostGeometryDto {
    #[serde(alias = "GFA")]
    pub gfa: f64,
    #[serde(alias = "compactness", alias = "AV", alias = "a_v")]
    pub av: f64,
}

impl From<HostGeometryDto> for GeometryMetrics {
    fn from(dto: HostGeometryDto) -> Self {
        GeometryMetrics::new(dto.gfa, dto.av)
    }
}
