//! Feature standardization.
//!
//! Learns per-feature mean and population standard deviation once from
//! training data, then maps raw vectors to zero mean / unit variance.

use serde::{Deserialize, Serialize};

use super::FeatureVector;
use crate::{Result, VitalError};

/// Per-feature `(mean, std)` pairs bound to the training schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingParameters {
    feature_names: Vec<String>,
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl ScalingParameters {
    /// Fit scaling statistics from training rows.
    ///
    /// # Errors
    /// Returns `DataError` if `rows` is empty, rows disagree on schema,
    /// a value is non-finite, or any feature has zero variance.
    pub fn fit(rows: &[FeatureVector]) -> Result<Self> {
        let first = rows
            .first()
            .ok_or_else(|| VitalError::Data("Cannot fit scaler on empty data".into()))?;
        let feature_names = first.names().to_vec();
        if feature_names.is_empty() {
            return Err(VitalError::Data("Feature vectors have no features".into()));
        }

        let n_features = feature_names.len();
        let mut sums = vec![0.0; n_features];
        let mut mins = vec![f64::INFINITY; n_features];
        let mut maxs = vec![f64::NEG_INFINITY; n_features];
        for (row_idx, row) in rows.iter().enumerate() {
            if !row.matches_schema(&feature_names) || row.values().len() != n_features {
                return Err(VitalError::Data(format!(
                    "Row {row_idx} does not match the schema of row 0"
                )));
            }
            for (j, &x) in row.values().iter().enumerate() {
                if !x.is_finite() {
                    return Err(VitalError::Data(format!(
                        "Row {row_idx} has non-finite value for {}",
                        feature_names[j]
                    )));
                }
                sums[j] += x;
                mins[j] = mins[j].min(x);
                maxs[j] = maxs[j].max(x);
            }
        }

        let n = rows.len() as f64;
        let means: Vec<f64> = sums.iter().map(|s| s / n).collect();

        let mut sq = vec![0.0; n_features];
        for row in rows {
            for (j, &x) in row.values().iter().enumerate() {
                let d = x - means[j];
                sq[j] += d * d;
            }
        }
        let stds: Vec<f64> = sq.iter().map(|s| (s / n).sqrt()).collect();

        // Constant columns are detected exactly; rounding in the mean can
        // leave a tiny nonzero std for large constants.
        if let Some(j) = (0..n_features).position(|j| maxs[j] == mins[j] || stds[j] <= 0.0) {
            return Err(VitalError::Data(format!(
                "Feature {} has zero variance",
                feature_names[j]
            )));
        }

        tracing::debug!("Fitted scaler on {} rows x {} features", rows.len(), n_features);

        Ok(Self {
            feature_names,
            means,
            stds,
        })
    }

    /// Standardize a raw vector: `(x - mean) / std` per feature.
    ///
    /// # Errors
    /// Returns `SchemaError` if arity, names, or order differ from the
    /// training schema, or a value is non-finite.
    pub fn transform(&self, v: &FeatureVector) -> Result<Vec<f64>> {
        if v.len() != self.feature_names.len() || v.names().len() != v.values().len() {
            return Err(VitalError::Schema(format!(
                "Feature count mismatch: got {}, expected {}",
                v.len(),
                self.feature_names.len()
            )));
        }
        if let Some((got, expected)) = v
            .names()
            .iter()
            .zip(&self.feature_names)
            .find(|(got, expected)| got != expected)
        {
            return Err(VitalError::Schema(format!(
                "Expected feature {expected}, got {got}"
            )));
        }

        v.values()
            .iter()
            .zip(self.means.iter().zip(&self.stds))
            .zip(&self.feature_names)
            .map(|((&x, (mean, std)), name)| {
                if x.is_finite() {
                    Ok((x - mean) / std)
                } else {
                    Err(VitalError::Schema(format!("Feature {name} is not finite")))
                }
            })
            .collect()
    }

    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[must_use]
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    #[must_use]
    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Structural self-check used when loading persisted parameters.
    pub(crate) fn is_consistent(&self) -> bool {
        let n = self.feature_names.len();
        n > 0
            && self.means.len() == n
            && self.stds.len() == n
            && self.means.iter().all(|m| m.is_finite())
            && self.stds.iter().all(|s| s.is_finite() && *s > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(a: f64, b: f64) -> FeatureVector {
        FeatureVector::from_pairs([("a", a), ("b", b)]).unwrap()
    }

    #[test]
    fn test_fit_mean_and_std() {
        let params = ScalingParameters::fit(&[row(1.0, 10.0), row(3.0, 30.0)]).unwrap();
        assert_eq!(params.means(), &[2.0, 20.0]);
        assert_eq!(params.stds(), &[1.0, 10.0]);
    }

    #[test]
    fn test_transform_standardizes() {
        let params = ScalingParameters::fit(&[row(1.0, 10.0), row(3.0, 30.0)]).unwrap();
        let scaled = params.transform(&row(3.0, 10.0)).unwrap();
        assert!((scaled[0] - 1.0).abs() < 1e-12);
        assert!((scaled[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_empty_is_data_error() {
        let err = ScalingParameters::fit(&[]).unwrap_err();
        assert!(matches!(err, VitalError::Data(_)));
    }

    #[test]
    fn test_fit_zero_variance_is_data_error() {
        let err = ScalingParameters::fit(&[row(1.0, 5.0), row(2.0, 5.0)]).unwrap_err();
        assert!(matches!(err, VitalError::Data(msg) if msg.contains('b')));
    }

    #[test]
    fn test_fit_large_constant_is_data_error() {
        for (constant, n) in [(1_000_000.1, 7), (98_765.4321, 3), (1_000_000.1, 10)] {
            let rows: Vec<FeatureVector> = (0..n)
                .map(|i| FeatureVector::from_pairs([("a", f64::from(i)), ("c", constant)]).unwrap())
                .collect();
            let err = ScalingParameters::fit(&rows).unwrap_err();
            assert!(
                matches!(&err, VitalError::Data(msg) if msg.contains('c')),
                "constant {constant} over {n} rows was accepted: {err}"
            );
        }
    }

    #[test]
    fn test_fit_mixed_schema_is_data_error() {
        let other = FeatureVector::from_pairs([("b", 1.0), ("a", 2.0)]).unwrap();
        let err = ScalingParameters::fit(&[row(1.0, 2.0), other]).unwrap_err();
        assert!(matches!(err, VitalError::Data(_)));
    }

    #[test]
    fn test_transform_rejects_reordered_features() {
        let params = ScalingParameters::fit(&[row(1.0, 10.0), row(3.0, 30.0)]).unwrap();
        let swapped = FeatureVector::from_pairs([("b", 1.0), ("a", 2.0)]).unwrap();
        assert!(matches!(
            params.transform(&swapped),
            Err(VitalError::Schema(_))
        ));
    }

    #[test]
    fn test_transform_rejects_missing_feature() {
        let params = ScalingParameters::fit(&[row(1.0, 10.0), row(3.0, 30.0)]).unwrap();
        let short = FeatureVector::from_pairs([("a", 1.0)]).unwrap();
        assert!(matches!(params.transform(&short), Err(VitalError::Schema(_))));
    }

    #[test]
    fn test_transform_rejects_nan() {
        let params = ScalingParameters::fit(&[row(1.0, 10.0), row(3.0, 30.0)]).unwrap();
        assert!(matches!(
            params.transform(&row(f64::NAN, 1.0)),
            Err(VitalError::Schema(_))
        ));
    }
}
