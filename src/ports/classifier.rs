//! Classifier port: Trait for swappable binary classifiers.
//!
//! The one-vs-rest ensemble trains one implementation per disease label.
//! Implementations must be serializable so that trained models can be
//! persisted inside a model bundle.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// A probabilistic binary classifier over standardized feature rows.
pub trait BinaryClassifier: Sized + Send + Sync + Serialize + DeserializeOwned {
    /// Hyperparameters.
    type Config: Clone + Send + Sync + std::fmt::Debug;

    /// Tag recorded in bundle manifests and checked on load.
    const KIND: &'static str;

    /// Train on rows `x` with binary targets `y`.
    ///
    /// Identical inputs and `seed` must produce an identical model.
    ///
    /// # Errors
    /// Returns `DataError` if `x` is empty, `x` and `y` differ in length, or
    /// rows differ in width. Returns `ConfigError` for invalid hyperparameters.
    fn fit(config: &Self::Config, x: &[Vec<f64>], y: &[bool], seed: u64) -> Result<Self>;

    /// Probability of the positive class, in `[0, 1]`.
    ///
    /// # Errors
    /// Returns `SchemaError` if `x` has the wrong width.
    fn predict_proba(&self, x: &[f64]) -> Result<f64>;

    /// Non-negative per-feature importance scores summing to 1 (or all zero).
    fn feature_importances(&self) -> Vec<f64>;

    /// Width of the rows the model was trained on.
    fn n_features(&self) -> usize;

    /// Structural check run after deserialization.
    ///
    /// # Errors
    /// Returns `CorruptionError` if the model is internally inconsistent.
    fn check_integrity(&self) -> Result<()>;
}

/// Validate the shape of a training set shared by all implementations.
///
/// # Errors
/// Returns `DataError` on an empty set, a length mismatch, ragged rows, or
/// non-finite values.
pub fn check_training_shape(x: &[Vec<f64>], y: &[bool]) -> Result<usize> {
    use crate::VitalError;

    let width = x
        .first()
        .map(Vec::len)
        .ok_or_else(|| VitalError::Data("Cannot fit a classifier on empty data".into()))?;
    if width == 0 {
        return Err(VitalError::Data("Training rows have no features".into()));
    }
    if x.len() != y.len() {
        return Err(VitalError::Data(format!(
            "Got {} rows but {} targets",
            x.len(),
            y.len()
        )));
    }
    if let Some(i) = x.iter().position(|row| row.len() != width) {
        return Err(VitalError::Data(format!(
            "Row {i} has width {}, expected {width}",
            x[i].len()
        )));
    }
    if x.iter().flatten().any(|v| !v.is_finite()) {
        return Err(VitalError::Data("Training rows contain non-finite values".into()));
    }
    Ok(width)
}
