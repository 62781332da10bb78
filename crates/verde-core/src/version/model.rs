//! Version records: one immutable (inputs, outputs) prediction pair.

use crate::analysis::Metric;
use crate::design::ParameterSet;
use crate::error::VerdeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Text stored as `outputs` when the predictor failed.
pub const PREDICTION_FAILED: &str = "prediction failed";

/// Identifier `V<n>`; ordering is by `n`, so `V10` sorts after `V2`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct VersionId(pub u32);

impl VersionId {
    pub fn number(self) -> u32 {
        self.0
    }

    /// The following id. Fails once `n` reaches `u32::MAX`.
    pub fn next(self) -> Result<VersionId, VerdeError> {
        self.0
            .checked_add(1)
            .map(VersionId)
            .ok_or_else(|| VerdeError::invariant(format!("no version id after {}", self)))
    }

    /// File name of this version in the iterations directory.
    pub fn file_name(self) -> String {
        format!("{}.json", self)
    }

    /// Parses a file name like `V3.json`; anything else is `None`.
    pub fn from_file_name(name: &str) -> Option<VersionId> {
        name.strip_suffix(".json")?.parse().ok()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0)
    }
}

impl FromStr for VersionId {
    type Err = VerdeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .trim()
            .strip_prefix(['V', 'v'])
            .ok_or_else(|| VerdeError::parse(format!("version id '{}' must start with V", s)))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VerdeError::parse(format!("invalid version id '{}'", s)));
        }
        // reject V01 so that ids and file names stay one-to-one
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(VerdeError::parse(format!("invalid version id '{}'", s)));
        }
        digits
            .parse()
            .map(VersionId)
            .map_err(|_| VerdeError::parse(format!("version id '{}' out of range", s)))
    }
}

impl From<VersionId> for String {
    fn from(id: VersionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for VersionId {
    type Error = VerdeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Outputs of a version: labeled metrics, or the failure marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutcome {
    Metrics(BTreeMap<String, f64>),
    Failed(String),
}

impl PredictionOutcome {
    pub fn from_values(values: &[f64; 7]) -> Self {
        Self::Metrics(Metric::label_values(values))
    }

    pub fn failed() -> Self {
        Self::Failed(PREDICTION_FAILED.to_string())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match self {
            Self::Metrics(values) => values.get(metric.label()).copied(),
            Self::Failed(_) => None,
        }
    }
}

/// A persisted design iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: VersionId,
    /// ISO 8601
    pub timestamp: String,
    pub inputs: ParameterSet,
    pub outputs: PredictionOutcome,
}

/// Whether `best` looks for the smallest or the largest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Min,
    Max,
}

impl FromStr for Direction {
    type Err = VerdeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "min" | "minimize" | "lowest" | "smallest" => Ok(Self::Min),
            "max" | "maximize" | "highest" | "largest" => Ok(Self::Max),
            other => Err(VerdeError::parse(format!("unknown direction '{}'", other))),
        }
    }
}

/// Min/max/mean of one metric across versions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub samples: usize,
}

/// Aggregate statistics of a version store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub versions: usize,
    pub failed: usize,
    pub metrics: BTreeMap<String, MetricSummary>,
}

/// Aggregates every metric over the successful records.
pub fn summarize_records(records: &[VersionRecord]) -> VersionSummary {
    let mut summary = VersionSummary {
        versions: records.len(),
        failed: records.iter().filter(|r| r.outputs.is_failed()).count(),
        metrics: BTreeMap::new(),
    };

    for metric in Metric::all() {
        let values: Vec<f64> = records
            .iter()
            .filter_map(|r| r.outputs.metric(metric))
            .collect();
        if values.is_empty() {
            continue;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        summary.metrics.insert(
            metric.label().to_string(),
            MetricSummary {
                min,
                max,
                mean,
                samples: values.len(),
            },
        );
    }
    summary
}

/// The version with the extreme value of `metric`. Ties go to the older one.
pub fn best_record(
    records: &[VersionRecord],
    metric: Metric,
    direction: Direction,
) -> Option<VersionId> {
    let mut best: Option<(VersionId, f64)> = None;
    for record in records {
        let Some(value) = record.outputs.metric(metric) else {
            continue;
        };
        let better = match (best, direction) {
            (None, _) => true,
            (Some((_, current)), Direction::Min) => value < current,
            (Some((_, current)), Direction::Max) => value > current,
        };
        if better {
            best = Some((record.version, value));
        }
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u32, gwp: Option<f64>) -> VersionRecord {
        let inputs = ParameterSet {
            ew_par: 0,
            ew_ins: 0,
            iw_par: 0,
            es_ins: 0,
            is_par: 0,
            ro_par: 0,
            ro_ins: 0,
            wwr: 0.3,
            av: 0.5,
            gfa: 200.0,
        };
        let outputs = match gwp {
            Some(g) => PredictionOutcome::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, g]),
            None => PredictionOutcome::failed(),
        };
        VersionRecord {
            version: VersionId(n),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            inputs,
            outputs,
        }
    }

    #[test]
    fn version_id_parsing() {
        assert_eq!("V0".parse::<VersionId>().unwrap(), VersionId(0));
        assert_eq!("V12".parse::<VersionId>().unwrap(), VersionId(12));
        assert!("12".parse::<VersionId>().is_err());
        assert!("V".parse::<VersionId>().is_err());
        assert!("V01".parse::<VersionId>().is_err());
        assert_eq!(VersionId::from_file_name("V3.json"), Some(VersionId(3)));
        assert_eq!(VersionId::from_file_name("V3.json.tmp"), None);
        assert!(VersionId(10) > VersionId(2));
    }

    #[test]
    fn next_id_does_not_wrap() {
        assert_eq!(VersionId(7).next().unwrap(), VersionId(8));
        assert!(matches!(
            VersionId(u32::MAX).next(),
            Err(VerdeError::InvariantViolation(_))
        ));
    }

    #[test]
    fn version_id_is_a_string_on_the_wire() {
        assert_eq!(serde_json::to_string(&VersionId(4)).unwrap(), "\"V4\"");
    }

    #[test]
    fn failed_outputs_serialize_as_text() {
        let json = serde_json::to_value(PredictionOutcome::failed()).unwrap();
        assert_eq!(json, "prediction failed");
        let back: PredictionOutcome = serde_json::from_value(json).unwrap();
        assert!(back.is_failed());
    }

    #[test]
    fn summary_skips_failed_versions() {
        let records = vec![record(0, Some(10.0)), record(1, None), record(2, Some(20.0))];
        let summary = summarize_records(&records);
        assert_eq!(summary.versions, 3);
        assert_eq!(summary.failed, 1);
        let gwp = summary.metrics["GWP total"];
        assert_eq!(gwp.min, 10.0);
        assert_eq!(gwp.max, 20.0);
        assert_eq!(gwp.mean, 15.0);
        assert_eq!(gwp.samples, 2);
    }

    #[test]
    fn best_by_direction() {
        let records = vec![record(0, Some(30.0)), record(1, Some(12.0)), record(2, Some(45.0))];
        assert_eq!(
            best_record(&records, Metric::GwpTotal, Direction::Min),
            Some(VersionId(1))
        );
        assert_eq!(
            best_record(&records, Metric::GwpTotal, Direction::Max),
            Some(VersionId(2))
        );
        assert_eq!(best_record(&[], Metric::GwpTotal, Direction::Min), None);
    }
}
