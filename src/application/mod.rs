//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement training,
//! persistence-aware model handles, and inference.

mod bundle;
mod ensemble;
mod inference;
pub mod synthetic;
mod training;
mod worker;

pub use bundle::{BundleMetadata, ModelBundle, ModelHandle, BUNDLE_FORMAT, BUNDLE_VERSION};
pub use ensemble::OneVsRest;
pub use inference::{Assessment, DiseasePredictor};
pub use training::{
    hamming_loss, subset_accuracy, Evaluation, TrainingReport, TrainingService, TrainingStage,
};
pub use worker::{TrainingProgress, TrainingWorker, TrainingWorkerHandle};

#[cfg(test)]
pub(crate) use bundle::tests;
