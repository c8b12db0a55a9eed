//! Prediction result types.
//!
//! Represents the output of the multi-label disease predictor.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Result, VitalError};

/// Probability cutoff at or above which a disease counts as predicted.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct DecisionThreshold(f64);

impl DecisionThreshold {
    pub const DEFAULT: Self = Self(0.5);

    /// # Errors
    /// Returns `ConfigError` unless `value` is finite and in `[0, 1]`.
    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(VitalError::Config(format!(
                "Decision threshold {value} must lie in [0, 1]"
            )))
        }
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for DecisionThreshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for DecisionThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Risk band for a single disease probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    /// No significant indicators
    Low,
    /// Follow-up recommended
    Moderate,
    /// Consultation advised
    High,
}

impl RiskLevel {
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability < 0.3 {
            Self::Low
        } else if probability < 0.7 {
            Self::Moderate
        } else {
            Self::High
        }
    }

    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Low risk - No significant indicators",
            Self::Moderate => "Moderate risk - Follow-up recommended",
            Self::High => "High risk - Consultation advised",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Per-disease probabilities plus the thresholded positive set.
///
/// An empty positive set means no disease was detected; it is not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    probabilities: BTreeMap<String, f64>,
    positives: BTreeSet<String>,
    threshold: DecisionThreshold,
}

impl PredictionResult {
    /// Threshold a probability mapping.
    #[must_use]
    pub fn new(probabilities: BTreeMap<String, f64>, threshold: DecisionThreshold) -> Self {
        let positives = probabilities
            .iter()
            .filter(|(_, &p)| p >= threshold.value())
            .map(|(name, _)| name.clone())
            .collect();
        Self {
            probabilities,
            positives,
            threshold,
        }
    }

    /// Re-derive the positive set under a different threshold.
    #[must_use]
    pub fn with_threshold(&self, threshold: DecisionThreshold) -> Self {
        Self::new(self.probabilities.clone(), threshold)
    }

    #[must_use]
    pub fn probabilities(&self) -> &BTreeMap<String, f64> {
        &self.probabilities
    }

    #[must_use]
    pub fn probability(&self, disease: &str) -> Option<f64> {
        self.probabilities.get(disease).copied()
    }

    #[must_use]
    pub fn positives(&self) -> &BTreeSet<String> {
        &self.positives
    }

    #[must_use]
    pub fn is_positive(&self, disease: &str) -> bool {
        self.positives.contains(disease)
    }

    /// `true` when no disease reached the threshold.
    #[must_use]
    pub fn no_disease_detected(&self) -> bool {
        self.positives.is_empty()
    }

    #[must_use]
    pub fn threshold(&self) -> DecisionThreshold {
        self.threshold
    }

    #[must_use]
    pub fn risk_level(&self, disease: &str) -> Option<RiskLevel> {
        self.probability(disease).map(RiskLevel::from_probability)
    }

    /// Diseases sorted by descending probability, ties broken by name.
    #[must_use]
    pub fn ranked(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .probabilities
            .iter()
            .map(|(name, &p)| (name.as_str(), p))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probs() -> BTreeMap<String, f64> {
        [("Anemia", 0.81), ("Diabetes", 0.12), ("Hypertension", 0.5)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let result = PredictionResult::new(probs(), DecisionThreshold::DEFAULT);
        assert!(result.is_positive("Anemia"));
        assert!(result.is_positive("Hypertension"));
        assert!(!result.is_positive("Diabetes"));
    }

    #[test]
    fn test_threshold_monotonicity() {
        let result = PredictionResult::new(probs(), DecisionThreshold::new(0.0).unwrap());
        let mut previous = result.positives().len();
        for step in 1..=20 {
            let t = DecisionThreshold::new(f64::from(step) / 20.0).unwrap();
            let size = result.with_threshold(t).positives().len();
            assert!(size <= previous);
            previous = size;
        }
    }

    #[test]
    fn test_empty_positive_set_is_valid() {
        let result = PredictionResult::new(probs(), DecisionThreshold::new(0.95).unwrap());
        assert!(result.no_disease_detected());
        assert_eq!(result.probabilities().len(), 3);
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(DecisionThreshold::new(1.5).is_err());
        assert!(DecisionThreshold::new(-0.1).is_err());
        assert!(DecisionThreshold::new(f64::NAN).is_err());
    }

    #[test]
    fn test_risk_level_from_probability() {
        assert_eq!(RiskLevel::from_probability(0.1), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.5), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.9), RiskLevel::High);
    }

    #[test]
    fn test_ranked() {
        let result = PredictionResult::new(probs(), DecisionThreshold::DEFAULT);
        let names: Vec<&str> = result.ranked().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Anemia", "Hypertension", "Diabetes"]);
    }
}
