//! Random forest binary classifier.
//!
//! Bagged gini decision trees with `sqrt(n_features)` random feature subsets
//! per split. Every tree draws its bootstrap sample and feature subsets from
//! its own `ChaCha20Rng`, seeded from the master seed, so a fixed seed
//! reproduces the forest exactly.

mod tree;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::ports::{check_training_shape, BinaryClassifier};
use crate::{Result, VitalError};

use tree::{DecisionTree, GrowParams};

/// Random forest hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Reweight classes inversely to their frequency.
    pub balanced_class_weight: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            balanced_class_weight: false,
        }
    }
}

impl ForestConfig {
    fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(VitalError::Config("Forest needs at least one tree".into()));
        }
        if self.max_depth == 0 {
            return Err(VitalError::Config("Forest max_depth must be positive".into()));
        }
        if self.min_samples_split < 2 {
            return Err(VitalError::Config("min_samples_split must be at least 2".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    trees: Vec<DecisionTree>,
}

/// Per-class weights `n / (2 * n_class)`, or `1.0` when a class is absent.
fn class_weights(y: &[bool], balanced: bool) -> (f64, f64) {
    let n_pos = y.iter().filter(|&&v| v).count();
    let n_neg = y.len() - n_pos;
    if !balanced || n_pos == 0 || n_neg == 0 {
        return (1.0, 1.0);
    }
    let n = y.len() as f64;
    (n / (2.0 * n_neg as f64), n / (2.0 * n_pos as f64))
}

impl BinaryClassifier for RandomForest {
    type Config = ForestConfig;

    const KIND: &'static str = "random_forest";

    fn fit(config: &ForestConfig, x: &[Vec<f64>], y: &[bool], seed: u64) -> Result<Self> {
        config.validate()?;
        let n_features = check_training_shape(x, y)?;
        let n = x.len();

        let (w_neg, w_pos) = class_weights(y, config.balanced_class_weight);
        let weights: Vec<f64> = y.iter().map(|&v| if v { w_pos } else { w_neg }).collect();

        let params = GrowParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: ((n_features as f64).sqrt() as usize).max(1),
        };

        let mut master = ChaCha20Rng::seed_from_u64(seed);
        let trees = (0..config.n_trees)
            .map(|_| {
                let mut rng = ChaCha20Rng::seed_from_u64(master.gen());
                let mut samples: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::grow(x, y, &weights, &mut samples, params, &mut rng)
            })
            .collect();

        Ok(Self { n_features, trees })
    }

    fn predict_proba(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.n_features {
            return Err(VitalError::Schema(format!(
                "Forest expects {} features, got {}",
                self.n_features,
                x.len()
            )));
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(x)).sum();
        Ok((sum / self.trees.len() as f64).clamp(0.0, 1.0))
    }

    fn feature_importances(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (acc, v) in out.iter_mut().zip(tree.importances()) {
                *acc += v;
            }
        }
        let total: f64 = out.iter().sum();
        if total > 0.0 {
            for v in &mut out {
                *v /= total;
            }
        }
        out
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn check_integrity(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(VitalError::Corruption("Forest has no trees".into()));
        }
        if let Some(i) = self
            .trees
            .iter()
            .position(|t| !t.is_consistent(self.n_features))
        {
            return Err(VitalError::Corruption(format!("Forest tree {i} is malformed")));
        }
        Ok(())
    }
}

impl RandomForest {
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Deepest tree in the forest.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(DecisionTree::depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Positive iff feature 0 is above 0.5; feature 1 is noise.
    fn data() -> (Vec<Vec<f64>>, Vec<bool>) {
        let x: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let a = f64::from(i) / 60.0;
                let b = f64::from((i * 37) % 60) / 60.0;
                vec![a, b]
            })
            .collect();
        let y = x.iter().map(|r| r[0] > 0.5).collect();
        (x, y)
    }

    fn small() -> ForestConfig {
        ForestConfig {
            n_trees: 15,
            ..ForestConfig::default()
        }
    }

    #[test]
    fn test_learns_threshold() {
        let (x, y) = data();
        let forest = RandomForest::fit(&small(), &x, &y, 42).unwrap();
        assert!(forest.predict_proba(&[0.95, 0.3]).unwrap() > 0.5);
        assert!(forest.predict_proba(&[0.05, 0.3]).unwrap() < 0.5);
    }

    #[test]
    fn test_deterministic_per_seed() {
        let (x, y) = data();
        let a = RandomForest::fit(&small(), &x, &y, 7).unwrap();
        let b = RandomForest::fit(&small(), &x, &y, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_importances_favor_signal() {
        let (x, y) = data();
        let forest = RandomForest::fit(&small(), &x, &y, 42).unwrap();
        let imp = forest.feature_importances();
        assert_eq!(imp.len(), 2);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_depth_respects_config() {
        let (x, y) = data();
        let config = ForestConfig {
            max_depth: 2,
            ..small()
        };
        let forest = RandomForest::fit(&config, &x, &y, 1).unwrap();
        assert!(forest.max_depth() <= 2);
        assert_eq!(forest.n_trees(), 15);
    }

    #[test]
    fn test_single_class_predicts_constant() {
        let (x, _) = data();
        let y = vec![false; x.len()];
        let forest = RandomForest::fit(&small(), &x, &y, 1).unwrap();
        assert_eq!(forest.predict_proba(&[0.9, 0.9]).unwrap(), 0.0);
    }

    #[test]
    fn test_balanced_weights() {
        let y = [true, false, false, false];
        let (w_neg, w_pos) = class_weights(&y, true);
        assert!((w_pos - 2.0).abs() < 1e-12);
        assert!((w_neg - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(class_weights(&y, false), (1.0, 1.0));
    }

    #[test]
    fn test_rejects_bad_input() {
        let (x, y) = data();
        assert!(matches!(
            RandomForest::fit(&small(), &[], &[], 1),
            Err(VitalError::Data(_))
        ));
        assert!(matches!(
            RandomForest::fit(&small(), &x, &y[..10], 1),
            Err(VitalError::Data(_))
        ));
        let no_trees = ForestConfig {
            n_trees: 0,
            ..small()
        };
        assert!(matches!(
            RandomForest::fit(&no_trees, &x, &y, 1),
            Err(VitalError::Config(_))
        ));
    }

    #[test]
    fn test_wrong_width_is_schema_error() {
        let (x, y) = data();
        let forest = RandomForest::fit(&small(), &x, &y, 1).unwrap();
        assert!(matches!(
            forest.predict_proba(&[0.5]),
            Err(VitalError::Schema(_))
        ));
    }

    #[test]
    fn test_serde_preserves_predictions() {
        let (x, y) = data();
        let forest = RandomForest::fit(&small(), &x, &y, 3).unwrap();
        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForest = serde_json::from_str(&json).unwrap();
        restored.check_integrity().unwrap();
        for row in &x {
            assert_eq!(
                forest.predict_proba(row).unwrap(),
                restored.predict_proba(row).unwrap()
            );
        }
    }
}
