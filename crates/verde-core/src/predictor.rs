//! ML predictor seam.

use crate::design::ParameterSet;
use crate::error::Result;

/// A pre-trained regressor: ten inputs in `FEATURE_ORDER`, seven outputs in
/// `Metric` order.
///
/// Prediction is CPU-bound and synchronous; callers off the async runtime
/// wrap it as they see fit.
pub trait Predictor: Send + Sync {
    fn predict(&self, inputs: &[f64; 10]) -> Result<[f64; 7]>;

    fn predict_parameters(&self, params: &ParameterSet) -> Result<[f64; 7]> {
        self.predict(&params.to_vector())
    }
}
