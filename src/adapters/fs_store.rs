//! Filesystem bundle store.
//!
//! A bundle is a directory of JSON files bound together by `manifest.json`:
//!
//! ```text
//! <dir>/scaler.json
//! <dir>/labels.json
//! <dir>/ensemble.json
//! <dir>/metadata.json
//! <dir>/manifest.json   (format, version, classifier kind, SHA-256 per file)
//! ```
//!
//! Every file is written to a temporary name and renamed into place; the
//! manifest goes last, so a crash mid-save never leaves a manifest that
//! vouches for half-written files. Loading verifies the manifest, each
//! digest, and the shape agreement of all parts before a bundle is built.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::application::{BundleMetadata, ModelBundle, OneVsRest, BUNDLE_FORMAT, BUNDLE_VERSION};
use crate::domain::{LabelSpace, ScalingParameters};
use crate::ports::{BinaryClassifier, BundleStore};
use crate::{Result, VitalError};

const MANIFEST_FILE: &str = "manifest.json";
const SCALER_FILE: &str = "scaler.json";
const LABELS_FILE: &str = "labels.json";
const ENSEMBLE_FILE: &str = "ensemble.json";
const METADATA_FILE: &str = "metadata.json";

const BUNDLE_FILES: [&str; 4] = [SCALER_FILE, LABELS_FILE, ENSEMBLE_FILE, METADATA_FILE];

#[derive(Debug, Serialize, Deserialize)]
struct BundleManifest {
    format: String,
    version: u32,
    classifier: String,
    created_at: DateTime<Utc>,
    /// File name -> lowercase hex SHA-256.
    files: BTreeMap<String, String>,
}

/// Fields every manifest version carries. Read first so a newer layout is
/// reported as a version mismatch rather than as a malformed file.
#[derive(Debug, Deserialize)]
struct ManifestHeader {
    format: String,
    version: u32,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Bundle directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsBundleStore {
    dir: PathBuf,
}

impl FsBundleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Classifier kind recorded in the manifest, without loading the bundle.
    ///
    /// # Errors
    /// Returns `CorruptionError` if the manifest is missing or unreadable,
    /// or `VersionError` if it was written by another bundle version.
    pub fn classifier_kind(&self) -> Result<String> {
        Ok(self.read_manifest()?.classifier)
    }

    /// Write `bytes` to `name` via a temporary file and rename.
    /// The temporary file is removed if any step fails.
    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let final_path = self.dir.join(name);
        let tmp_path = self.dir.join(format!(".{name}.tmp"));
        let written = (|| -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&tmp_path, &final_path)
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Read the manifest, checking format and version before the rest of
    /// its layout.
    fn read_manifest(&self) -> Result<BundleManifest> {
        let path = self.dir.join(MANIFEST_FILE);
        let bytes = fs::read(&path).map_err(|e| {
            VitalError::Corruption(format!("Cannot read manifest {}: {e}", path.display()))
        })?;

        let header: ManifestHeader = serde_json::from_slice(&bytes)
            .map_err(|e| VitalError::Corruption(format!("Invalid manifest.json: {e}")))?;
        if header.format != BUNDLE_FORMAT {
            return Err(VitalError::Corruption(format!(
                "Unknown bundle format {:?}",
                header.format
            )));
        }
        if header.version != BUNDLE_VERSION {
            return Err(VitalError::Version {
                found: header.version.to_string(),
                supported: BUNDLE_VERSION.to_string(),
            });
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| VitalError::Corruption(format!("Invalid manifest.json: {e}")))
    }

    /// Read a file bound by the manifest and check its digest.
    fn read_verified(&self, manifest: &BundleManifest, name: &str) -> Result<Vec<u8>> {
        let expected = manifest
            .files
            .get(name)
            .ok_or_else(|| VitalError::Corruption(format!("Manifest does not bind {name}")))?;
        let bytes = fs::read(self.dir.join(name))
            .map_err(|e| VitalError::Corruption(format!("Cannot read {name}: {e}")))?;
        if !sha256_hex(&bytes).eq_ignore_ascii_case(expected) {
            return Err(VitalError::Corruption(format!("File hash mismatch for {name}")));
        }
        Ok(bytes)
    }
}

fn parse<T: DeserializeOwned>(name: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| VitalError::Corruption(format!("Invalid {name}: {e}")))
}

impl BundleStore for FsBundleStore {
    fn save<C: BinaryClassifier>(&self, bundle: &ModelBundle<C>) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let contents: [(&str, Vec<u8>); 4] = [
            (SCALER_FILE, serde_json::to_vec_pretty(bundle.scaler())?),
            (LABELS_FILE, serde_json::to_vec_pretty(bundle.labels())?),
            (ENSEMBLE_FILE, serde_json::to_vec(bundle.ensemble())?),
            (METADATA_FILE, serde_json::to_vec_pretty(bundle.metadata())?),
        ];

        let mut files = BTreeMap::new();
        for (name, bytes) in &contents {
            self.write_atomic(name, bytes)?;
            files.insert((*name).to_string(), sha256_hex(bytes));
        }

        let manifest = BundleManifest {
            format: BUNDLE_FORMAT.to_string(),
            version: BUNDLE_VERSION,
            classifier: C::KIND.to_string(),
            created_at: bundle.metadata().created_at,
            files,
        };
        self.write_atomic(MANIFEST_FILE, &serde_json::to_vec_pretty(&manifest)?)?;

        tracing::info!(
            "Saved {} bundle with {} labels to {}",
            C::KIND,
            bundle.labels().len(),
            self.dir.display()
        );
        Ok(())
    }

    fn load<C: BinaryClassifier>(&self) -> Result<ModelBundle<C>> {
        let manifest = self.read_manifest()?;
        if manifest.classifier != C::KIND {
            return Err(VitalError::Version {
                found: format!("classifier {}", manifest.classifier),
                supported: format!("classifier {}", C::KIND),
            });
        }

        let mut raw = BTreeMap::new();
        for name in BUNDLE_FILES {
            raw.insert(name, self.read_verified(&manifest, name)?);
        }

        let scaler: ScalingParameters = parse(SCALER_FILE, &raw[SCALER_FILE])?;
        let labels: LabelSpace = parse(LABELS_FILE, &raw[LABELS_FILE])?;
        let labels = LabelSpace::from_names(labels.names().to_vec())?;
        let ensemble: OneVsRest<C> = parse(ENSEMBLE_FILE, &raw[ENSEMBLE_FILE])?;
        let metadata: BundleMetadata = parse(METADATA_FILE, &raw[METADATA_FILE])?;

        if metadata.format_version != manifest.version {
            return Err(VitalError::Corruption(format!(
                "Metadata version {} disagrees with manifest version {}",
                metadata.format_version, manifest.version
            )));
        }
        for (i, member) in ensemble.members().iter().enumerate() {
            member.check_integrity().map_err(|e| {
                VitalError::Corruption(format!("Ensemble member {i}: {e}"))
            })?;
        }

        let bundle = ModelBundle::new(scaler, labels, ensemble, metadata)?;
        tracing::info!(
            "Loaded {} bundle with {} labels from {}",
            C::KIND,
            bundle.labels().len(),
            self.dir.display()
        );
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ForestConfig, LogisticRegression, RandomForest};
    use crate::application::synthetic::{generate, SyntheticConfig};
    use crate::application::tests::tiny_bundle;
    use crate::application::{DiseasePredictor, TrainingService};
    use crate::domain::DecisionThreshold;
    use tempfile::tempdir;

    fn saved() -> (tempfile::TempDir, FsBundleStore) {
        let dir = tempdir().unwrap();
        let store = FsBundleStore::new(dir.path().join("bundle"));
        store.save(&tiny_bundle()).unwrap();
        (dir, store)
    }

    fn rewrite_manifest(store: &FsBundleStore, edit: impl FnOnce(&mut serde_json::Value)) {
        let path = store.dir().join(MANIFEST_FILE);
        let mut value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        edit(&mut value);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_round_trip_is_exact() {
        let dir = tempdir().unwrap();
        let store = FsBundleStore::new(dir.path());
        let bundle = tiny_bundle();
        store.save(&bundle).unwrap();

        let loaded: ModelBundle<LogisticRegression> = store.load().unwrap();
        assert_eq!(loaded, bundle);
    }

    #[test]
    fn test_forest_bundle_round_trip_predicts_identically() {
        let data = generate(&SyntheticConfig {
            rows: 150,
            seed: 7,
            extra_disease_rate: 0.0,
        })
        .unwrap();
        let config = ForestConfig {
            n_trees: 5,
            ..ForestConfig::default()
        };
        let (bundle, _) = TrainingService::<RandomForest>::new(config, 7)
            .with_test_fraction(None)
            .train(&data)
            .unwrap();

        let dir = tempdir().unwrap();
        let store = FsBundleStore::new(dir.path());
        store.save(&bundle).unwrap();
        assert_eq!(store.classifier_kind().unwrap(), RandomForest::KIND);

        let loaded: ModelBundle<RandomForest> = store.load().unwrap();
        assert_eq!(loaded, bundle);
        for row in data.rows() {
            let before =
                DiseasePredictor::predict(&row.features, &bundle, DecisionThreshold::DEFAULT)
                    .unwrap();
            let after =
                DiseasePredictor::predict(&row.features, &loaded, DecisionThreshold::DEFAULT)
                    .unwrap();
            assert_eq!(before, after);
        }
    }

    #[test]
    fn test_classifier_kind_reads_manifest() {
        let (_dir, store) = saved();
        assert_eq!(store.classifier_kind().unwrap(), LogisticRegression::KIND);
    }

    #[test]
    fn test_no_temporary_files_left() {
        let (_dir, store) = saved();
        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_tampered_file_is_corruption() {
        let (_dir, store) = saved();
        let path = store.dir().join(SCALER_FILE);
        let mut bytes = fs::read(&path).unwrap();
        bytes.push(b' ');
        fs::write(&path, bytes).unwrap();

        let err = store.load::<LogisticRegression>().unwrap_err();
        assert!(matches!(err, VitalError::Corruption(msg) if msg.contains("hash mismatch")));
    }

    #[test]
    fn test_missing_file_is_corruption() {
        let (_dir, store) = saved();
        fs::remove_file(store.dir().join(ENSEMBLE_FILE)).unwrap();
        assert!(matches!(
            store.load::<LogisticRegression>(),
            Err(VitalError::Corruption(_))
        ));
    }

    #[test]
    fn test_missing_manifest_is_corruption() {
        let dir = tempdir().unwrap();
        let store = FsBundleStore::new(dir.path());
        assert!(matches!(
            store.load::<LogisticRegression>(),
            Err(VitalError::Corruption(_))
        ));
    }

    #[test]
    fn test_unknown_version_is_version_error() {
        let (_dir, store) = saved();
        rewrite_manifest(&store, |m| m["version"] = serde_json::json!(2));
        let err = store.load::<LogisticRegression>().unwrap_err();
        assert!(matches!(err, VitalError::Version { found, .. } if found == "2"));
    }

    #[test]
    fn test_future_manifest_layout_is_version_error() {
        let (_dir, store) = saved();
        fs::write(
            store.dir().join(MANIFEST_FILE),
            br#"{"format":"vitaldiet-bundle","version":2,"parts":[]}"#,
        )
        .unwrap();

        let err = store.load::<LogisticRegression>().unwrap_err();
        assert!(matches!(err, VitalError::Version { found, .. } if found == "2"));
        assert!(matches!(
            store.classifier_kind(),
            Err(VitalError::Version { .. })
        ));
    }

    #[test]
    fn test_failed_write_removes_temporary_file() {
        let (_dir, store) = saved();
        // A non-empty directory at the target makes the rename fail.
        let blocked = store.dir().join(SCALER_FILE);
        fs::remove_file(&blocked).unwrap();
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("occupied"), b"x").unwrap();

        assert!(store.write_atomic(SCALER_FILE, b"{}").is_err());
        assert!(!store.dir().join(format!(".{SCALER_FILE}.tmp")).exists());
        assert!(store.save(&tiny_bundle()).is_err());
        assert!(!store.dir().join(format!(".{SCALER_FILE}.tmp")).exists());
    }

    #[test]
    fn test_wrong_format_is_corruption() {
        let (_dir, store) = saved();
        rewrite_manifest(&store, |m| m["format"] = serde_json::json!("other"));
        assert!(matches!(
            store.load::<LogisticRegression>(),
            Err(VitalError::Corruption(_))
        ));
    }

    #[test]
    fn test_wrong_classifier_kind_is_version_error() {
        let (_dir, store) = saved();
        assert!(matches!(
            store.load::<RandomForest>(),
            Err(VitalError::Version { .. })
        ));
    }

    #[test]
    fn test_inconsistent_shapes_are_corruption() {
        let (_dir, store) = saved();
        // Drop one label and re-bind the file so only the shape check can fail.
        let labels = serde_json::to_vec_pretty(
            &LabelSpace::from_names(vec!["A".into()]).unwrap(),
        )
        .unwrap();
        fs::write(store.dir().join(LABELS_FILE), &labels).unwrap();
        let digest = sha256_hex(&labels);
        rewrite_manifest(&store, |m| m["files"][LABELS_FILE] = serde_json::json!(digest));

        let err = store.load::<LogisticRegression>().unwrap_err();
        assert!(matches!(err, VitalError::Corruption(msg) if msg.contains("members")));
    }
}
