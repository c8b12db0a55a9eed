//! Pipeline configuration.
//!
//! Defaults match the reference training setup (100 trees, depth 10, seed
//! 42, 20% holdout, threshold 0.5). Each value can be overridden from the
//! environment:
//!
//! - `VITALDIET_THRESHOLD`: decision threshold in `[0, 1]`
//! - `VITALDIET_SEED`: master seed (u64)
//! - `VITALDIET_TREES`: forest size (> 0)
//! - `VITALDIET_MAX_DEPTH`: forest depth limit (> 0)
//! - `VITALDIET_TEST_FRACTION`: holdout fraction in `(0, 1)`, or `0` to disable
//! - `VITALDIET_BALANCED_WEIGHTS`: `true`/`false`
//! - `VITALDIET_DIET_RULES`: path to a JSON rule table (builtin otherwise)
//!
//! Invalid values are ignored with a warning.

use std::path::PathBuf;

use crate::adapters::{ForestConfig, LogisticConfig};
use crate::application::TrainingService;
use crate::domain::{DecisionThreshold, RuleTable};
use crate::ports::BinaryClassifier;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub threshold: DecisionThreshold,
    pub seed: u64,
    pub forest: ForestConfig,
    pub logistic: LogisticConfig,
    /// `None` trains on every row without a holdout.
    pub test_fraction: Option<f64>,
    pub diet_rules: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: DecisionThreshold::DEFAULT,
            seed: 42,
            forest: ForestConfig::default(),
            logistic: LogisticConfig::default(),
            test_fraction: Some(0.2),
            diet_rules: None,
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

impl PipelineConfig {
    /// Defaults overridden by `VITALDIET_*` environment variables.
    #[must_use]
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("VITALDIET_THRESHOLD") {
            match v.trim().parse::<f64>().ok().map(DecisionThreshold::new) {
                Some(Ok(t)) => cfg.threshold = t,
                _ => tracing::warn!("Ignoring invalid VITALDIET_THRESHOLD={v}"),
            }
        }

        if let Some(v) = lookup("VITALDIET_SEED") {
            match v.trim().parse::<u64>() {
                Ok(seed) => cfg.seed = seed,
                Err(_) => tracing::warn!("Ignoring invalid VITALDIET_SEED={v}"),
            }
        }

        if let Some(v) = lookup("VITALDIET_TREES") {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => cfg.forest.n_trees = n,
                _ => tracing::warn!("Ignoring invalid VITALDIET_TREES={v}"),
            }
        }

        if let Some(v) = lookup("VITALDIET_MAX_DEPTH") {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => cfg.forest.max_depth = n,
                _ => tracing::warn!("Ignoring invalid VITALDIET_MAX_DEPTH={v}"),
            }
        }

        if let Some(v) = lookup("VITALDIET_TEST_FRACTION") {
            match v.trim().parse::<f64>() {
                Ok(x) if x == 0.0 => cfg.test_fraction = None,
                Ok(x) if x > 0.0 && x < 1.0 => cfg.test_fraction = Some(x),
                _ => tracing::warn!("Ignoring invalid VITALDIET_TEST_FRACTION={v}"),
            }
        }

        if let Some(v) = lookup("VITALDIET_BALANCED_WEIGHTS") {
            match parse_bool(&v) {
                Some(b) => {
                    cfg.forest.balanced_class_weight = b;
                    cfg.logistic.balanced_class_weight = b;
                }
                None => tracing::warn!("Ignoring invalid VITALDIET_BALANCED_WEIGHTS={v}"),
            }
        }

        if let Some(v) = lookup("VITALDIET_DIET_RULES") {
            let path = v.trim();
            if path.is_empty() {
                tracing::warn!("Ignoring empty VITALDIET_DIET_RULES");
            } else {
                cfg.diet_rules = Some(PathBuf::from(path));
            }
        }

        cfg
    }

    /// The configured rule table, or the builtin one.
    ///
    /// # Errors
    /// Returns `IoError` or `ConfigError` if a configured file cannot be
    /// loaded.
    pub fn load_rules(&self) -> Result<RuleTable> {
        match &self.diet_rules {
            Some(path) => RuleTable::from_path(path),
            None => RuleTable::builtin(),
        }
    }

    /// Training service for `C` with this configuration's seed, holdout
    /// and threshold.
    #[must_use]
    pub fn training_service<C: BinaryClassifier>(&self, classifier: C::Config) -> TrainingService<C> {
        TrainingService::new(classifier, self.seed)
            .with_test_fraction(self.test_fraction)
            .with_threshold(self.threshold)
    }
}
