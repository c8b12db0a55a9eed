//! Model training and holdout evaluation.
//!
//! Training pipeline:
//! 1. Fit the label space over every disease seen in the dataset
//! 2. Shuffle and hold out a test split (seeded)
//! 3. Fit the scaler on the training split only
//! 4. Train one binary classifier per label
//! 5. Score the holdout with hamming loss and subset accuracy

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{BundleMetadata, DiseasePredictor, ModelBundle, OneVsRest};
use crate::domain::{Dataset, DecisionThreshold, LabelSpace, ScalingParameters};
use crate::ports::BinaryClassifier;
use crate::{Result, VitalError};

/// Pipeline step reported to progress observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStage {
    Splitting,
    Scaling,
    Fitting { labels: usize },
    Evaluating { rows: usize },
}

impl std::fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Splitting => write!(f, "splitting dataset"),
            Self::Scaling => write!(f, "fitting scaler"),
            Self::Fitting { labels } => write!(f, "training {labels} classifiers"),
            Self::Evaluating { rows } => write!(f, "evaluating on {rows} holdout rows"),
        }
    }
}

/// Holdout metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub threshold: DecisionThreshold,
    /// Fraction of wrong label bits over all rows and labels.
    pub hamming_loss: f64,
    /// Fraction of rows whose whole label set was predicted exactly.
    pub subset_accuracy: f64,
    pub per_label_accuracy: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub classifier_kind: String,
    pub train_rows: usize,
    pub test_rows: usize,
    pub labels: Vec<String>,
    pub evaluation: Option<Evaluation>,
}

/// Fraction of mismatching indicator bits.
///
/// Returns `0.0` for empty input.
#[must_use]
pub fn hamming_loss(truth: &[Vec<u8>], predicted: &[Vec<u8>]) -> f64 {
    let mut wrong = 0usize;
    let mut total = 0usize;
    for (t, p) in truth.iter().zip(predicted) {
        wrong += t.iter().zip(p).filter(|(a, b)| a != b).count();
        total += t.len();
    }
    if total == 0 {
        0.0
    } else {
        wrong as f64 / total as f64
    }
}

/// Fraction of rows predicted exactly.
///
/// Returns `0.0` for empty input.
#[must_use]
pub fn subset_accuracy(truth: &[Vec<u8>], predicted: &[Vec<u8>]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let exact = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    exact as f64 / truth.len() as f64
}

/// Trains `C` ensembles into model bundles.
#[derive(Debug, Clone)]
pub struct TrainingService<C: BinaryClassifier> {
    classifier: C::Config,
    seed: u64,
    test_fraction: Option<f64>,
    threshold: DecisionThreshold,
}

impl<C: BinaryClassifier> TrainingService<C> {
    /// Service with a 20% holdout and the default threshold.
    pub fn new(classifier: C::Config, seed: u64) -> Self {
        Self {
            classifier,
            seed,
            test_fraction: Some(0.2),
            threshold: DecisionThreshold::DEFAULT,
        }
    }

    /// Set the holdout fraction; `None` trains on every row.
    #[must_use]
    pub fn with_test_fraction(mut self, test_fraction: Option<f64>) -> Self {
        self.test_fraction = test_fraction;
        self
    }

    /// Threshold used for holdout scoring.
    #[must_use]
    pub fn with_threshold(mut self, threshold: DecisionThreshold) -> Self {
        self.threshold = threshold;
        self
    }

    /// # Errors
    /// As [`train_with_progress`](Self::train_with_progress).
    pub fn train(&self, dataset: &Dataset) -> Result<(ModelBundle<C>, TrainingReport)> {
        self.train_with_progress(dataset, |_| {})
    }

    /// Train a bundle, reporting each stage to `progress`.
    ///
    /// # Errors
    /// Returns `DataError` for an empty dataset, a dataset without any
    /// disease label, or data the scaler cannot fit (e.g. a constant
    /// feature). Returns `ConfigError` for an invalid holdout fraction or
    /// classifier configuration.
    pub fn train_with_progress<F>(
        &self,
        dataset: &Dataset,
        mut progress: F,
    ) -> Result<(ModelBundle<C>, TrainingReport)>
    where
        F: FnMut(TrainingStage),
    {
        if dataset.is_empty() {
            return Err(VitalError::Data("Training dataset is empty".into()));
        }
        let labels = LabelSpace::fit(dataset.label_sets());
        if labels.is_empty() {
            return Err(VitalError::Data("Training dataset has no disease labels".into()));
        }

        progress(TrainingStage::Splitting);
        let (train, test) = match self.test_fraction {
            Some(fraction) => dataset.split(fraction, self.seed)?,
            None => (dataset.clone(), Dataset::default()),
        };
        tracing::info!(
            "Training {} on {} rows, holding out {} ({} labels)",
            C::KIND,
            train.len(),
            test.len(),
            labels.len()
        );

        progress(TrainingStage::Scaling);
        let scaler = ScalingParameters::fit(&train.features())?;
        let x = train
            .rows()
            .iter()
            .map(|r| scaler.transform(&r.features))
            .collect::<Result<Vec<_>>>()?;
        let y = train
            .rows()
            .iter()
            .map(|r| labels.encode(&r.diseases))
            .collect::<Result<Vec<_>>>()?;

        progress(TrainingStage::Fitting {
            labels: labels.len(),
        });
        let ensemble = OneVsRest::<C>::fit(&self.classifier, &x, &y, self.seed)?;
        let metadata = BundleMetadata::new(&scaler, &ensemble, self.seed, train.len());
        let bundle = ModelBundle::new(scaler, labels, ensemble, metadata)?;

        let evaluation = if test.is_empty() {
            None
        } else {
            progress(TrainingStage::Evaluating { rows: test.len() });
            Some(self.evaluate(&bundle, &test)?)
        };

        if let Some(eval) = &evaluation {
            tracing::info!(
                "Holdout hamming loss {:.4}, subset accuracy {:.4}",
                eval.hamming_loss,
                eval.subset_accuracy
            );
        }

        let report = TrainingReport {
            classifier_kind: C::KIND.to_string(),
            train_rows: train.len(),
            test_rows: test.len(),
            labels: bundle.labels().names().to_vec(),
            evaluation,
        };
        Ok((bundle, report))
    }

    fn evaluate(&self, bundle: &ModelBundle<C>, test: &Dataset) -> Result<Evaluation> {
        let labels = bundle.labels();
        let mut truth = Vec::with_capacity(test.len());
        let mut predicted = Vec::with_capacity(test.len());
        for row in test.rows() {
            let result = DiseasePredictor::predict(&row.features, bundle, self.threshold)?;
            truth.push(labels.encode(&row.diseases)?);
            predicted.push(labels.encode(result.positives())?);
        }

        let per_label_accuracy = labels
            .names()
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let correct = truth
                    .iter()
                    .zip(&predicted)
                    .filter(|(t, p)| t[i] == p[i])
                    .count();
                (name.clone(), correct as f64 / truth.len() as f64)
            })
            .collect();

        Ok(Evaluation {
            threshold: self.threshold,
            hamming_loss: hamming_loss(&truth, &predicted),
            subset_accuracy: subset_accuracy(&truth, &predicted),
            per_label_accuracy,
        })
    }
}
