//! Ports layer: Trait definitions at the seams.
//!
//! Following Hexagonal Architecture, these traits separate the application
//! from concrete learning algorithms and storage backends.

mod bundle_store;
mod classifier;

pub use bundle_store::BundleStore;
pub use classifier::{check_training_shape, BinaryClassifier};
