//! Trained model bundles and hot-swappable handles.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OneVsRest;
use crate::domain::{LabelSpace, ScalingParameters};
use crate::ports::{BinaryClassifier, BundleStore};
use crate::{Result, VitalError};

/// Bundle format tag written to every manifest.
pub const BUNDLE_FORMAT: &str = "vitaldiet-bundle";

/// The only bundle version this build reads and writes.
pub const BUNDLE_VERSION: u32 = 1;

/// Descriptive data stored alongside a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub format_version: u32,
    pub classifier_kind: String,
    pub created_at: DateTime<Utc>,
    pub seed: u64,
    pub training_rows: usize,
    /// Averaged ensemble importance per feature name.
    pub feature_importances: BTreeMap<String, f64>,
}

impl BundleMetadata {
    /// Metadata for a freshly trained `C` ensemble.
    #[must_use]
    pub fn new<C: BinaryClassifier>(
        scaler: &ScalingParameters,
        ensemble: &OneVsRest<C>,
        seed: u64,
        training_rows: usize,
    ) -> Self {
        let feature_importances = scaler
            .feature_names()
            .iter()
            .cloned()
            .zip(ensemble.feature_importances())
            .collect();
        Self {
            format_version: BUNDLE_VERSION,
            classifier_kind: C::KIND.to_string(),
            created_at: Utc::now(),
            seed,
            training_rows,
            feature_importances,
        }
    }

    /// Features by descending importance.
    #[must_use]
    pub fn ranked_importances(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .feature_importances
            .iter()
            .map(|(name, &v)| (name.as_str(), v))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

/// Scaler, label space, ensemble and metadata of one trained model.
///
/// Immutable once built. Shape agreement between the parts is checked at
/// construction, so a bundle in hand is always usable for inference.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBundle<C> {
    scaler: ScalingParameters,
    labels: LabelSpace,
    ensemble: OneVsRest<C>,
    metadata: BundleMetadata,
}

impl<C: BinaryClassifier> ModelBundle<C> {
    /// # Errors
    /// Returns `CorruptionError` if the parts disagree: scaler width differs
    /// from any member's width, label count differs from member count, the
    /// label space is empty, or metadata names another classifier kind.
    pub fn new(
        scaler: ScalingParameters,
        labels: LabelSpace,
        ensemble: OneVsRest<C>,
        metadata: BundleMetadata,
    ) -> Result<Self> {
        if !scaler.is_consistent() {
            return Err(VitalError::Corruption("Scaler parameters are inconsistent".into()));
        }
        if labels.is_empty() {
            return Err(VitalError::Corruption("Label space is empty".into()));
        }
        if labels.len() != ensemble.len() {
            return Err(VitalError::Corruption(format!(
                "Label space has {} labels but ensemble has {} members",
                labels.len(),
                ensemble.len()
            )));
        }
        if let Some(i) = ensemble
            .members()
            .iter()
            .position(|m| m.n_features() != scaler.n_features())
        {
            return Err(VitalError::Corruption(format!(
                "Member {i} expects {} features but scaler has {}",
                ensemble.members()[i].n_features(),
                scaler.n_features()
            )));
        }
        if metadata.classifier_kind != C::KIND {
            return Err(VitalError::Corruption(format!(
                "Metadata names classifier {} but bundle holds {}",
                metadata.classifier_kind,
                C::KIND
            )));
        }
        Ok(Self {
            scaler,
            labels,
            ensemble,
            metadata,
        })
    }

    #[must_use]
    pub fn scaler(&self) -> &ScalingParameters {
        &self.scaler
    }

    #[must_use]
    pub fn labels(&self) -> &LabelSpace {
        &self.labels
    }

    #[must_use]
    pub fn ensemble(&self) -> &OneVsRest<C> {
        &self.ensemble
    }

    #[must_use]
    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    /// Feature names in the order inference expects them.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        self.scaler.feature_names()
    }
}

/// Shared, atomically replaceable reference to the active bundle.
///
/// Readers clone the inner `Arc` and keep using that bundle even if it is
/// replaced while they run.
#[derive(Debug)]
pub struct ModelHandle<C> {
    current: RwLock<Arc<ModelBundle<C>>>,
}

impl<C: BinaryClassifier> ModelHandle<C> {
    #[must_use]
    pub fn new(bundle: ModelBundle<C>) -> Self {
        Self {
            current: RwLock::new(Arc::new(bundle)),
        }
    }

    /// The bundle active right now.
    #[must_use]
    pub fn current(&self) -> Arc<ModelBundle<C>> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a new bundle and return the previous one.
    pub fn replace(&self, bundle: ModelBundle<C>) -> Arc<ModelBundle<C>> {
        self.replace_arc(Arc::new(bundle))
    }

    /// Swap in an already shared bundle and return the previous one.
    pub fn replace_arc(&self, bundle: Arc<ModelBundle<C>>) -> Arc<ModelBundle<C>> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, bundle)
    }

    /// Load a bundle from `store` and swap it in.
    ///
    /// On error the current bundle stays active.
    ///
    /// # Errors
    /// Propagates any load error from the store.
    pub fn reload<S: BundleStore>(&self, store: &S) -> Result<()> {
        let bundle = store.load::<C>()?;
        self.replace(bundle);
        tracing::info!("Model bundle reloaded");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::{LogisticConfig, LogisticRegression};
    use crate::domain::FeatureVector;

    /// A small logistic bundle: label "A" fires for large `x`, "B" for small `y`.
    pub(crate) fn tiny_bundle() -> ModelBundle<LogisticRegression> {
        let rows: Vec<FeatureVector> = (0..30)
            .map(|i| {
                FeatureVector::from_pairs([
                    ("x", f64::from(i)),
                    ("y", f64::from((i * 11) % 30)),
                ])
                .unwrap()
            })
            .collect();
        let scaler = ScalingParameters::fit(&rows).unwrap();
        let x: Vec<Vec<f64>> = rows.iter().map(|r| scaler.transform(r).unwrap()).collect();
        let y: Vec<Vec<u8>> = rows
            .iter()
            .map(|r| {
                vec![
                    u8::from(r.get("x").unwrap() >= 15.0),
                    u8::from(r.get("y").unwrap() < 15.0),
                ]
            })
            .collect();
        let labels = LabelSpace::from_names(vec!["A".into(), "B".into()]).unwrap();
        let ensemble = OneVsRest::fit(&LogisticConfig::default(), &x, &y, 42).unwrap();
        let metadata = BundleMetadata::new(&scaler, &ensemble, 42, rows.len());
        ModelBundle::new(scaler, labels, ensemble, metadata).unwrap()
    }

    #[test]
    fn test_shape_mismatch_is_corruption() {
        let bundle = tiny_bundle();
        let labels = LabelSpace::from_names(vec!["A".into()]).unwrap();
        let err = ModelBundle::new(
            bundle.scaler().clone(),
            labels,
            bundle.ensemble().clone(),
            bundle.metadata().clone(),
        )
        .unwrap_err();
        assert!(matches!(err, VitalError::Corruption(_)));
    }

    #[test]
    fn test_metadata_records_importances() {
        let bundle = tiny_bundle();
        let meta = bundle.metadata();
        assert_eq!(meta.classifier_kind, "logistic_regression");
        assert_eq!(meta.format_version, BUNDLE_VERSION);
        assert_eq!(meta.feature_importances.len(), 2);
        assert_eq!(meta.ranked_importances().len(), 2);
    }

    #[test]
    fn test_handle_replace_keeps_old_readers_valid() {
        let handle = ModelHandle::new(tiny_bundle());
        let before = handle.current();
        let old = handle.replace(tiny_bundle());
        assert!(Arc::ptr_eq(&before, &old));
        assert!(!Arc::ptr_eq(&before, &handle.current()));
        assert_eq!(before.labels().len(), 2);
    }

    #[test]
    fn test_failed_reload_keeps_current_bundle() {
        use crate::adapters::FsBundleStore;

        let dir = tempfile::tempdir().unwrap();
        let handle = ModelHandle::new(tiny_bundle());
        let before = handle.current();

        let err = handle.reload(&FsBundleStore::new(dir.path())).unwrap_err();
        assert!(matches!(err, VitalError::Corruption(_)));
        assert!(Arc::ptr_eq(&before, &handle.current()));

        let store = FsBundleStore::new(dir.path());
        store.save(&tiny_bundle()).unwrap();
        handle.reload(&store).unwrap();
        assert!(!Arc::ptr_eq(&before, &handle.current()));
    }
}
