//! Logistic regression binary classifier.
//!
//! Full-batch gradient descent on the weighted log loss with an L2 penalty.
//! Training starts from zero weights, so the result does not depend on the
//! seed.

use serde::{Deserialize, Serialize};

use crate::ports::{check_training_shape, BinaryClassifier};
use crate::{Result, VitalError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    /// L2 penalty strength (not applied to the bias).
    pub l2: f64,
    pub balanced_class_weight: bool,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 500,
            l2: 0.01,
            balanced_class_weight: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    weights: Vec<f64>,
    bias: f64,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl LogisticRegression {
    fn linear(&self, x: &[f64]) -> f64 {
        self.bias + self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
    }

    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[must_use]
    pub fn bias(&self) -> f64 {
        self.bias
    }
}

impl BinaryClassifier for LogisticRegression {
    type Config = LogisticConfig;

    const KIND: &'static str = "logistic_regression";

    fn fit(config: &LogisticConfig, x: &[Vec<f64>], y: &[bool], _seed: u64) -> Result<Self> {
        if !(config.learning_rate.is_finite() && config.learning_rate > 0.0) {
            return Err(VitalError::Config("Learning rate must be positive".into()));
        }
        if !(config.l2.is_finite() && config.l2 >= 0.0) {
            return Err(VitalError::Config("L2 penalty must be non-negative".into()));
        }
        let n_features = check_training_shape(x, y)?;

        let n_pos = y.iter().filter(|&&v| v).count();
        let n_neg = y.len() - n_pos;
        let (w_neg, w_pos) = if config.balanced_class_weight && n_pos > 0 && n_neg > 0 {
            let n = y.len() as f64;
            (n / (2.0 * n_neg as f64), n / (2.0 * n_pos as f64))
        } else {
            (1.0, 1.0)
        };
        let sample_weights: Vec<f64> = y.iter().map(|&v| if v { w_pos } else { w_neg }).collect();
        let total_weight: f64 = sample_weights.iter().sum();

        let mut model = Self {
            weights: vec![0.0; n_features],
            bias: 0.0,
        };
        let mut grad = vec![0.0; n_features];

        for _ in 0..config.epochs {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_bias = 0.0;

            for ((row, &target), &sw) in x.iter().zip(y).zip(&sample_weights) {
                let err = sw * (sigmoid(model.linear(row)) - if target { 1.0 } else { 0.0 });
                for (g, v) in grad.iter_mut().zip(row) {
                    *g += err * v;
                }
                grad_bias += err;
            }

            for (w, g) in model.weights.iter_mut().zip(&grad) {
                *w -= config.learning_rate * (g / total_weight + config.l2 * *w);
            }
            model.bias -= config.learning_rate * grad_bias / total_weight;
        }

        Ok(model)
    }

    fn predict_proba(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.weights.len() {
            return Err(VitalError::Schema(format!(
                "Model expects {} features, got {}",
                self.weights.len(),
                x.len()
            )));
        }
        Ok(sigmoid(self.linear(x)))
    }

    fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.weights.iter().map(|w| w.abs()).sum();
        if total > 0.0 {
            self.weights.iter().map(|w| w.abs() / total).collect()
        } else {
            vec![0.0; self.weights.len()]
        }
    }

    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn check_integrity(&self) -> Result<()> {
        if self.weights.is_empty() {
            return Err(VitalError::Corruption("Logistic model has no weights".into()));
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(VitalError::Corruption(
                "Logistic model has non-finite coefficients".into(),
            ));
        }
        Ok(())
    }
}
