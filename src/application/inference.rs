//! Disease prediction and diet assessment.
//!
//! The predictor is stateless: every call receives the bundle explicitly, so
//! concurrent callers can share one `Arc<ModelBundle>` without locking.
//!
//! Pipeline per call:
//! - Standardize the raw vector with the bundle's scaler
//! - Query every one-vs-rest member for its disease probability
//! - Threshold into the positive disease set
//! - Optionally derive a diet plan from that set

use serde::{Deserialize, Serialize};

use super::ModelBundle;
use crate::domain::{
    recommend, DecisionThreshold, DietPlan, FeatureVector, PredictionResult, RuleTable,
};
use crate::ports::BinaryClassifier;
use crate::Result;

/// Prediction plus the diet plan derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub prediction: PredictionResult,
    pub diet: DietPlan,
}

/// Stateless inference entry points.
pub struct DiseasePredictor;

impl DiseasePredictor {
    /// Predict per-disease probabilities and the positive set for `raw`.
    ///
    /// An empty positive set is a valid result.
    ///
    /// # Errors
    /// Returns `SchemaError` if `raw` does not match the training schema.
    /// No partial result is produced.
    pub fn predict<C: BinaryClassifier>(
        raw: &FeatureVector,
        bundle: &ModelBundle<C>,
        threshold: DecisionThreshold,
    ) -> Result<PredictionResult> {
        let scaled = bundle.scaler().transform(raw)?;
        let probabilities = bundle.ensemble().predict_proba(&scaled, bundle.labels())?;
        let result = PredictionResult::new(probabilities, threshold);

        tracing::debug!(
            "Predicted {} of {} diseases at threshold {}",
            result.positives().len(),
            bundle.labels().len(),
            threshold
        );
        Ok(result)
    }

    /// Predict, then recommend a diet for the positive set.
    ///
    /// # Errors
    /// As [`predict`](Self::predict).
    pub fn assess<C: BinaryClassifier>(
        raw: &FeatureVector,
        bundle: &ModelBundle<C>,
        threshold: DecisionThreshold,
        rules: &RuleTable,
    ) -> Result<Assessment> {
        let prediction = Self::predict(raw, bundle, threshold)?;
        let diet = recommend(prediction.positives(), rules);
        Ok(Assessment { prediction, diet })
    }
}
