//! # VitalDiet
//!
//! Multi-label disease prediction from vital-sign measurements, with a
//! deterministic diet recommendation engine on top of the predicted disease set.
//!
//! This crate provides:
//! - Feature standardization and multi-label encoding
//! - One-vs-rest ensembles of swappable binary classifiers (random forest, logistic)
//! - Versioned, integrity-checked model bundles
//! - A priority-ordered diet rule engine with transparent conflict resolution
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types and pure logic (vitals, scaler, label space, diet rules)
//! - `ports`: Trait definitions at the seams (binary classifier, bundle store)
//! - `adapters`: Concrete implementations (random forest, logistic regression,
//!   filesystem bundle store, JSON-lines datasets, log sanitization)
//! - `application`: Use cases orchestrating domain and ports (training, inference)
//! - `config`: Environment-driven pipeline configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::{Assessment, DiseasePredictor, ModelBundle, ModelHandle, OneVsRest};
pub use config::PipelineConfig;
pub use domain::{DietPlan, FeatureVector, LabelSpace, PredictionResult, RuleTable, ScalingParameters};

/// Result type for VitalDiet operations
pub type Result<T> = std::result::Result<T, VitalError>;

/// Main error type for VitalDiet
#[derive(Debug, thiserror::Error)]
pub enum VitalError {
    #[error("Invalid training data: {0}")]
    Data(String),

    #[error("Feature schema mismatch: {0}")]
    Schema(String),

    #[error("Unknown disease label: {0}")]
    UnknownLabel(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unsupported bundle version: found {found}, supported {supported}")]
    Version { found: String, supported: String },

    #[error("Corrupted model bundle: {0}")]
    Corruption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
