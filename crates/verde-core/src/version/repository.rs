//! Version repository trait.

use super::model::{
    Direction, PredictionOutcome, VersionId, VersionRecord, VersionSummary, best_record,
    summarize_records,
};
use crate::analysis::Metric;
use crate::design::ParameterSet;
use crate::error::Result;
use async_trait::async_trait;

/// Append-only store of design iterations.
///
/// Ids are dense from `V0` upward and never reused. Implementations do not
/// need to support concurrent writers.
#[async_trait]
pub trait VersionRepository: Send + Sync {
    /// Persists a new version and returns its id (`max + 1`, or `V0`).
    async fn save(&self, inputs: ParameterSet, outputs: PredictionOutcome) -> Result<VersionId>;

    /// All versions ordered by id.
    async fn list(&self) -> Result<Vec<VersionRecord>>;

    /// Loads one version; `NotFound` if absent.
    async fn load(&self, id: VersionId) -> Result<VersionRecord>;

    async fn latest(&self) -> Result<Option<VersionRecord>> {
        Ok(self.list().await?.pop())
    }

    async fn summarize(&self) -> Result<VersionSummary> {
        Ok(summarize_records(&self.list().await?))
    }

    async fn best(&self, metric: Metric, direction: Direction) -> Result<Option<VersionId>> {
        Ok(best_record(&self.list().await?, metric, direction))
    }
}
