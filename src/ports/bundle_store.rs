//! Bundle store port: Trait for model bundle persistence.

use crate::application::ModelBundle;
use crate::ports::BinaryClassifier;
use crate::Result;

/// Persistent location for a single model bundle.
pub trait BundleStore: Send + Sync {
    /// Persist a bundle, replacing any previous one at this location.
    ///
    /// # Errors
    /// Returns `IoError` or `SerializationError` if writing fails.
    fn save<C: BinaryClassifier>(&self, bundle: &ModelBundle<C>) -> Result<()>;

    /// Load and fully verify a bundle.
    ///
    /// # Errors
    /// Returns `VersionError` for an unsupported format version or classifier
    /// kind, and `CorruptionError` for missing files, checksum mismatches or
    /// inconsistent shapes.
    fn load<C: BinaryClassifier>(&self) -> Result<ModelBundle<C>>;
}
