//! Versioned iteration domain module.

mod model;
mod repository;

pub use model::{
    Direction, MetricSummary, PREDICTION_FAILED, PredictionOutcome, VersionId, VersionRecord,
    VersionSummary, best_record, summarize_records,
};
pub use repository::VersionRepository;
