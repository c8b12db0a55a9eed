//! Seeded synthetic patient data.
//!
//! Vitals are drawn from clipped normal distributions (CRP from an
//! exponential) and labeled with simple clinical cut-offs, plus a small
//! chance of one random extra diagnosis so that labels are not a pure
//! function of the features.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::domain::{Dataset, LabeledRow, Sex, VitalReadings};
use crate::{Result, VitalError};

/// Every diagnosis the generator can emit.
pub const SYNTHETIC_DISEASES: [&str; 10] = [
    "Anemia",
    "Hypertension",
    "Diabetes",
    "Heart Disease",
    "Vitamin D Deficiency",
    "Kidney Disease",
    "High Cholesterol",
    "Iron Deficiency",
    "Obesity",
    "Malnutrition",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub rows: usize,
    pub seed: u64,
    /// Probability of adding one random extra diagnosis to a row.
    pub extra_disease_rate: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            rows: 5000,
            seed: 42,
            extra_disease_rate: 0.1,
        }
    }
}

/// Standard normal sample via Box-Muller.
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    // Avoid ln(0).
    let mut u1: f64 = rng.gen();
    if u1 == 0.0 {
        u1 = f64::MIN_POSITIVE;
    }
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn clipped_normal<R: Rng>(rng: &mut R, mean: f64, std: f64, lo: f64, hi: f64) -> f64 {
    (mean + std * standard_normal(rng)).clamp(lo, hi)
}

fn exponential<R: Rng>(rng: &mut R, mean: f64) -> f64 {
    let u: f64 = rng.gen();
    -mean * (1.0 - u).ln()
}

fn sample_readings<R: Rng>(rng: &mut R) -> VitalReadings {
    let sex = if rng.gen_bool(0.5) { Sex::Male } else { Sex::Female };
    let hemoglobin_mean = match sex {
        Sex::Male => 14.0,
        Sex::Female => 13.0,
    };
    VitalReadings {
        age: f64::from(rng.gen_range(18u32..=85)),
        hemoglobin: clipped_normal(rng, hemoglobin_mean, 2.0, 8.0, 18.0),
        bp_systolic: clipped_normal(rng, 120.0, 20.0, 80.0, 200.0),
        bp_diastolic: clipped_normal(rng, 80.0, 15.0, 50.0, 120.0),
        heart_rate: clipped_normal(rng, 75.0, 15.0, 45.0, 120.0),
        hba1c: clipped_normal(rng, 5.7, 1.2, 4.0, 10.0),
        vitamin_d: clipped_normal(rng, 30.0, 10.0, 10.0, 50.0),
        ldl: clipped_normal(rng, 100.0, 30.0, 50.0, 200.0),
        iron: clipped_normal(rng, 100.0, 30.0, 30.0, 180.0),
        creatinine: clipped_normal(rng, 1.0, 0.5, 0.5, 3.0),
        mch: clipped_normal(rng, 29.0, 2.0, 20.0, 40.0),
        mchc: clipped_normal(rng, 33.0, 2.0, 30.0, 38.0),
        crp: exponential(rng, 2.0).clamp(0.0, 50.0),
    }
}

/// Diagnoses implied by the cut-off rules alone.
#[must_use]
pub fn rule_based_diseases(r: &VitalReadings) -> BTreeSet<String> {
    let checks = [
        (r.hemoglobin < 12.0 || r.iron < 60.0, "Anemia"),
        (r.bp_systolic > 140.0 || r.bp_diastolic > 90.0, "Hypertension"),
        (r.hba1c > 6.5, "Diabetes"),
        (r.heart_rate < 50.0 || r.heart_rate > 100.0, "Heart Disease"),
        (r.vitamin_d < 20.0, "Vitamin D Deficiency"),
        (r.creatinine > 1.5, "Kidney Disease"),
        (r.ldl > 130.0, "High Cholesterol"),
    ];
    checks
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, name)| (*name).to_string())
        .collect()
}

/// Generate a labeled dataset in the canonical vital schema.
///
/// # Errors
/// Returns `ConfigError` for zero rows or an extra-disease rate outside
/// `[0, 1]`.
pub fn generate(config: &SyntheticConfig) -> Result<Dataset> {
    if config.rows == 0 {
        return Err(VitalError::Config("Synthetic dataset needs at least one row".into()));
    }
    if !(0.0..=1.0).contains(&config.extra_disease_rate) {
        return Err(VitalError::Config(format!(
            "Extra disease rate {} must lie in [0, 1]",
            config.extra_disease_rate
        )));
    }

    let mut rng = ChaCha20Rng::seed_from_u64(config.seed);
    let rows = (0..config.rows)
        .map(|_| {
            let readings = sample_readings(&mut rng);
            let mut diseases = rule_based_diseases(&readings);
            if rng.gen_bool(config.extra_disease_rate) {
                if let Some(extra) = SYNTHETIC_DISEASES.choose(&mut rng) {
                    diseases.insert((*extra).to_string());
                }
            }
            LabeledRow::new(readings.to_feature_vector(), diseases)
        })
        .collect();

    tracing::info!(
        "Generated {} synthetic rows (seed {})",
        config.rows,
        config.seed
    );
    Dataset::new(rows)
}
