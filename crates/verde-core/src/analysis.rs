//! Predicted metrics and the ML output document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use strum::{EnumIter, IntoEnumIterator};

/// The seven regressor targets, in output-vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter)]
pub enum Metric {
    Eui,
    CoolingDemand,
    HeatingDemand,
    OperationalCarbon,
    EmbodiedA1A3,
    EmbodiedAD,
    GwpTotal,
}

/// Which group of `ml_output.json` a metric is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricGroup {
    Energy,
    Carbon,
}

impl Metric {
    pub fn all() -> impl Iterator<Item = Metric> {
        Metric::iter()
    }

    /// Label used as key in version outputs and the ML output document.
    pub fn label(self) -> &'static str {
        match self {
            Self::Eui => "EUI",
            Self::CoolingDemand => "Cooling Demand",
            Self::HeatingDemand => "Heating Demand",
            Self::OperationalCarbon => "Operational Carbon",
            Self::EmbodiedA1A3 => "Embodied Carbon A1-A3",
            Self::EmbodiedAD => "Embodied Carbon A-D",
            Self::GwpTotal => "GWP total",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Eui | Self::CoolingDemand | Self::HeatingDemand => "kWh/m²a",
            _ => "kgCO2e/m²",
        }
    }

    pub fn group(self) -> MetricGroup {
        match self {
            Self::Eui | Self::CoolingDemand | Self::HeatingDemand => MetricGroup::Energy,
            _ => MetricGroup::Carbon,
        }
    }

    /// Accepts full labels and the short names people type ("gwp", "eui",
    /// "heating", "a1-a3"), case-insensitively.
    pub fn from_label(text: &str) -> Option<Metric> {
        let key = text.trim().to_lowercase().replace('_', " ");
        if let Some(exact) = Metric::iter().find(|m| m.label().to_lowercase() == key) {
            return Some(exact);
        }
        let metric = match key.as_str() {
            "eui" | "energy" | "energy use intensity" => Self::Eui,
            "cooling" | "cooling demand" => Self::CoolingDemand,
            "heating" | "heating demand" => Self::HeatingDemand,
            "operational" | "operational carbon" | "operational c" => Self::OperationalCarbon,
            "a1-a3" | "embodied a1-a3" | "embodied" => Self::EmbodiedA1A3,
            "a-d" | "embodied a-d" => Self::EmbodiedAD,
            "gwp" | "gwp total" | "total gwp" | "total" => Self::GwpTotal,
            _ => return None,
        };
        Some(metric)
    }

    /// Labels each value of a prediction vector.
    pub fn label_values(values: &[f64; 7]) -> BTreeMap<String, f64> {
        Metric::iter()
            .zip(values.iter())
            .map(|(metric, value)| (metric.label().to_string(), *value))
            .collect()
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Contents of `knowledge/ml_output.json`.
///
/// Only `carbon` and `energy` are interpreted; every other top-level key is
/// kept verbatim in `extra` and forwarded to the responders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MlOutput {
    #[serde(default)]
    pub carbon: Map<String, Value>,
    #[serde(default)]
    pub energy: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MlOutput {
    pub fn from_prediction(values: &[f64; 7]) -> Self {
        let mut output = Self::default();
        for (metric, value) in Metric::all().zip(values.iter()) {
            let group = match metric.group() {
                MetricGroup::Energy => &mut output.energy,
                MetricGroup::Carbon => &mut output.carbon,
            };
            group.insert(metric.label().to_string(), Value::from(*value));
        }
        output
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Numeric value of a metric, looked up by label in its group.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        let group = match metric.group() {
            MetricGroup::Energy => &self.energy,
            MetricGroup::Carbon => &self.carbon,
        };
        group.get(metric.label()).and_then(Value::as_f64)
    }

    pub fn is_empty(&self) -> bool {
        self.carbon.is_empty() && self.energy.is_empty() && self.extra.is_empty()
    }
}
