//! Labeled training data.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use super::FeatureVector;
use crate::{Result, VitalError};

/// One patient record: raw vitals plus the diagnosed disease set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    pub features: FeatureVector,
    pub diseases: BTreeSet<String>,
}

impl LabeledRow {
    #[must_use]
    pub fn new(features: FeatureVector, diseases: BTreeSet<String>) -> Self {
        Self { features, diseases }
    }
}

/// A collection of labeled rows sharing one feature schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<LabeledRow>,
}

impl Dataset {
    /// # Errors
    /// Returns `DataError` if rows disagree on feature names or order.
    pub fn new(rows: Vec<LabeledRow>) -> Result<Self> {
        if let Some(first) = rows.first() {
            let schema = first.features.names();
            if let Some(i) = rows
                .iter()
                .position(|r| !r.features.matches_schema(schema))
            {
                return Err(VitalError::Data(format!(
                    "Row {i} does not match the feature schema of row 0"
                )));
            }
        }
        Ok(Self { rows })
    }

    #[must_use]
    pub fn rows(&self) -> &[LabeledRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Feature names of the shared schema (empty for an empty dataset).
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        self.rows
            .first()
            .map(|r| r.features.names())
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn features(&self) -> Vec<FeatureVector> {
        self.rows.iter().map(|r| r.features.clone()).collect()
    }

    pub fn label_sets(&self) -> impl Iterator<Item = &BTreeSet<String>> {
        self.rows.iter().map(|r| &r.diseases)
    }

    /// Shuffle with `seed` and hold out `ceil(test_fraction * n)` rows.
    ///
    /// Both halves are guaranteed non-empty.
    ///
    /// # Errors
    /// Returns `ConfigError` unless `0 < test_fraction < 1`, and `DataError`
    /// with fewer than two rows.
    pub fn split(&self, test_fraction: f64, seed: u64) -> Result<(Dataset, Dataset)> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(VitalError::Config(format!(
                "Test fraction {test_fraction} must lie in (0, 1)"
            )));
        }
        let n = self.rows.len();
        if n < 2 {
            return Err(VitalError::Data(format!(
                "Need at least 2 rows to split, got {n}"
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let n_test = ((test_fraction * n as f64).ceil() as usize).clamp(1, n - 1);
        let (test_idx, train_idx) = indices.split_at(n_test);

        let pick = |idx: &[usize]| Dataset {
            rows: idx.iter().map(|&i| self.rows[i].clone()).collect(),
        };
        Ok((pick(train_idx), pick(test_idx)))
    }
}
