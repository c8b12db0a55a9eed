//! One-vs-rest multi-label classifier.
//!
//! Decomposes the multi-label problem into one independent binary problem
//! per label column. Member `i` predicts label `i` of the label space the
//! ensemble was trained with.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::domain::LabelSpace;
use crate::ports::BinaryClassifier;
use crate::{Result, VitalError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneVsRest<C> {
    members: Vec<C>,
}

impl<C: BinaryClassifier> OneVsRest<C> {
    /// Train one classifier per label column of `y`.
    ///
    /// Member seeds are drawn from a `ChaCha20Rng` seeded with `seed`, so
    /// identical inputs always produce identical ensembles.
    ///
    /// # Errors
    /// Returns `DataError` if `x` or `y` is empty, their lengths differ, rows
    /// have unequal width, or indicator vectors have inconsistent width.
    pub fn fit(config: &C::Config, x: &[Vec<f64>], y: &[Vec<u8>], seed: u64) -> Result<Self> {
        if x.is_empty() || y.is_empty() {
            return Err(VitalError::Data("Cannot train on empty data".into()));
        }
        if x.len() != y.len() {
            return Err(VitalError::Data(format!(
                "Got {} feature rows but {} label rows",
                x.len(),
                y.len()
            )));
        }
        let n_labels = y[0].len();
        if n_labels == 0 {
            return Err(VitalError::Data("Label space is empty".into()));
        }
        if let Some(i) = y.iter().position(|row| row.len() != n_labels) {
            return Err(VitalError::Data(format!(
                "Label row {i} has width {}, expected {n_labels}",
                y[i].len()
            )));
        }
        let width = x[0].len();
        if let Some(i) = x.iter().position(|row| row.len() != width) {
            return Err(VitalError::Data(format!(
                "Feature row {i} has width {}, expected {width}",
                x[i].len()
            )));
        }

        let mut master = ChaCha20Rng::seed_from_u64(seed);
        let members = (0..n_labels)
            .map(|label| {
                let target: Vec<bool> = y.iter().map(|row| row[label] == 1).collect();
                let member_seed: u64 = master.gen();
                tracing::debug!(
                    "Training {} for label {label} ({} positives)",
                    C::KIND,
                    target.iter().filter(|&&t| t).count()
                );
                C::fit(config, x, &target, member_seed)
            })
            .collect::<Result<Vec<C>>>()?;

        Ok(Self { members })
    }

    #[must_use]
    pub fn from_members(members: Vec<C>) -> Self {
        Self { members }
    }

    /// Per-label probabilities keyed by disease name.
    ///
    /// # Errors
    /// Returns `SchemaError` if `x` has the wrong width, and `CorruptionError`
    /// if `space` does not match the ensemble size.
    pub fn predict_proba(&self, x: &[f64], space: &LabelSpace) -> Result<BTreeMap<String, f64>> {
        if space.len() != self.members.len() {
            return Err(VitalError::Corruption(format!(
                "Label space has {} labels but ensemble has {} members",
                space.len(),
                self.members.len()
            )));
        }
        self.members
            .iter()
            .zip(space.names())
            .map(|(member, name)| Ok((name.clone(), member.predict_proba(x)?)))
            .collect()
    }

    /// Member importances averaged per feature.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let Some(width) = self.n_features() else {
            return Vec::new();
        };
        let mut out = vec![0.0; width];
        for member in &self.members {
            for (acc, v) in out.iter_mut().zip(member.feature_importances()) {
                *acc += v;
            }
        }
        let n = self.members.len() as f64;
        out.iter_mut().for_each(|v| *v /= n);
        out
    }

    #[must_use]
    pub fn members(&self) -> &[C] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Feature width of the first member.
    #[must_use]
    pub fn n_features(&self) -> Option<usize> {
        self.members.first().map(BinaryClassifier::n_features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ForestConfig, LogisticConfig, LogisticRegression, RandomForest};

    fn space() -> LabelSpace {
        LabelSpace::from_names(vec!["High".into(), "Low".into()]).unwrap()
    }

    /// Label 0 fires for large x0, label 1 for small x1.
    fn data() -> (Vec<Vec<f64>>, Vec<Vec<u8>>) {
        let x: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![f64::from(i) / 20.0 - 1.0, f64::from((i * 7) % 40) / 20.0 - 1.0])
            .collect();
        let y = x
            .iter()
            .map(|r| vec![u8::from(r[0] > 0.0), u8::from(r[1] < 0.0)])
            .collect();
        (x, y)
    }

    #[test]
    fn test_one_member_per_label() {
        let (x, y) = data();
        let model = OneVsRest::<LogisticRegression>::fit(&LogisticConfig::default(), &x, &y, 1).unwrap();
        assert_eq!(model.len(), 2);
        assert_eq!(model.n_features(), Some(2));

        let probs = model.predict_proba(&[0.9, 0.9], &space()).unwrap();
        assert!(probs["High"] > 0.5);
        assert!(probs["Low"] < 0.5);
    }

    #[test]
    fn test_forest_ensemble_is_deterministic() {
        let (x, y) = data();
        let config = ForestConfig {
            n_trees: 5,
            ..ForestConfig::default()
        };
        let a = OneVsRest::<RandomForest>::fit(&config, &x, &y, 42).unwrap();
        let b = OneVsRest::<RandomForest>::fit(&config, &x, &y, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_importances_are_averaged() {
        let (x, y) = data();
        let model = OneVsRest::<LogisticRegression>::fit(&LogisticConfig::default(), &x, &y, 1).unwrap();
        let imp = model.feature_importances();
        assert_eq!(imp.len(), 2);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_shape_errors() {
        let (x, y) = data();
        let config = LogisticConfig::default();
        assert!(matches!(
            OneVsRest::<LogisticRegression>::fit(&config, &x[..3], &y, 1),
            Err(VitalError::Data(_))
        ));
        let mut ragged = y.clone();
        ragged[5] = vec![1];
        assert!(matches!(
            OneVsRest::<LogisticRegression>::fit(&config, &x, &ragged, 1),
            Err(VitalError::Data(_))
        ));
        assert!(matches!(
            OneVsRest::<LogisticRegression>::fit(&config, &[], &[], 1),
            Err(VitalError::Data(_))
        ));
    }

    #[test]
    fn test_label_space_mismatch() {
        let (x, y) = data();
        let model = OneVsRest::<LogisticRegression>::fit(&LogisticConfig::default(), &x, &y, 1).unwrap();
        let wrong = LabelSpace::from_names(vec!["Only".into()]).unwrap();
        assert!(matches!(
            model.predict_proba(&[0.0, 0.0], &wrong),
            Err(VitalError::Corruption(_))
        ));
    }
}
