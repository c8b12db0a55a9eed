//! Adapters layer: Concrete implementations of ports.
//!
//! - `forest`: random forest binary classifier
//! - `logistic`: logistic regression binary classifier
//! - `fs_store`: versioned, checksummed bundle directories
//! - `dataset_io`: JSON-lines training data
//! - `sanitize`: identifier redaction for logs

pub mod dataset_io;
mod forest;
mod fs_store;
mod logistic;
pub mod sanitize;

pub use forest::{ForestConfig, RandomForest};
pub use fs_store::FsBundleStore;
pub use logistic::{LogisticConfig, LogisticRegression};
