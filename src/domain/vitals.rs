//! Vital-sign feature vectors.
//!
//! The canonical schema follows the vital disease dataset: age plus twelve
//! laboratory and cardiovascular measurements. Models may be trained on any
//! schema, but the order fixed at training time is enforced at inference.

use serde::{Deserialize, Serialize};

use crate::{Result, VitalError};

/// Biological sex, used only for sex-specific reference ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl std::str::FromStr for Sex {
    type Err = VitalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "male" => Ok(Sex::Male),
            "f" | "female" => Ok(Sex::Female),
            other => Err(VitalError::Config(format!(
                "Unknown sex {other:?} (expected male or female)"
            ))),
        }
    }
}

/// Input checks for a canonical feature vector, reported alongside a
/// prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalScreen {
    /// Values outside the plausible input range.
    pub out_of_range: Vec<String>,
    /// Vitals outside their clinical reference range. Without a known sex,
    /// only vitals abnormal for both sexes are listed.
    pub abnormal: Vec<VitalSign>,
}

/// A single measured vital in the canonical schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VitalSign {
    Age,
    Hemoglobin,
    BpSystolic,
    BpDiastolic,
    HeartRate,
    Hba1c,
    VitaminD,
    Ldl,
    Iron,
    Creatinine,
    Mch,
    Mchc,
    Crp,
}

impl VitalSign {
    /// Canonical feature order.
    pub const ALL: [VitalSign; 13] = [
        Self::Age,
        Self::Hemoglobin,
        Self::BpSystolic,
        Self::BpDiastolic,
        Self::HeartRate,
        Self::Hba1c,
        Self::VitaminD,
        Self::Ldl,
        Self::Iron,
        Self::Creatinine,
        Self::Mch,
        Self::Mchc,
        Self::Crp,
    ];

    /// Column name used in datasets and persisted schemas.
    #[must_use]
    pub fn column(&self) -> &'static str {
        match self {
            Self::Age => "Age",
            Self::Hemoglobin => "Hemoglobin",
            Self::BpSystolic => "BP_Systolic",
            Self::BpDiastolic => "BP_Diastolic",
            Self::HeartRate => "Heart_Rate",
            Self::Hba1c => "HbA1c",
            Self::VitaminD => "Vitamin_D",
            Self::Ldl => "LDL",
            Self::Iron => "Iron",
            Self::Creatinine => "Creatinine",
            Self::Mch => "MCH",
            Self::Mchc => "MCHC",
            Self::Crp => "CRP",
        }
    }

    /// Look up a vital by column name.
    #[must_use]
    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.column() == name)
    }

    #[must_use]
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Age => "years",
            Self::Hemoglobin => "g/dL",
            Self::BpSystolic | Self::BpDiastolic => "mmHg",
            Self::HeartRate => "bpm",
            Self::Hba1c => "%",
            Self::VitaminD => "ng/mL",
            Self::Ldl => "mg/dL",
            Self::Iron => "μg/dL",
            Self::Creatinine => "mg/dL",
            Self::Mch => "pg",
            Self::Mchc => "g/dL",
            Self::Crp => "mg/L",
        }
    }

    /// Plausible input range accepted at data entry (inclusive).
    #[must_use]
    pub fn input_range(&self) -> (f64, f64) {
        match self {
            Self::Age => (1.0, 120.0),
            Self::Hemoglobin => (5.0, 20.0),
            Self::BpSystolic => (70.0, 200.0),
            Self::BpDiastolic => (40.0, 120.0),
            Self::HeartRate => (40.0, 150.0),
            Self::Hba1c => (4.0, 10.0),
            Self::VitaminD => (10.0, 60.0),
            Self::Ldl => (50.0, 200.0),
            Self::Iron => (30.0, 180.0),
            Self::Creatinine => (0.5, 3.0),
            Self::Crp => (0.0, 50.0),
            Self::Mch => (20.0, 40.0),
            Self::Mchc => (30.0, 38.0),
        }
    }

    /// Whether `value` lies inside the clinical reference range.
    #[must_use]
    pub fn is_normal(&self, value: f64, sex: Sex) -> bool {
        match self {
            Self::Age => true,
            Self::Hemoglobin => match sex {
                Sex::Male => (13.5..=17.5).contains(&value),
                Sex::Female => (12.0..=16.0).contains(&value),
            },
            Self::BpSystolic => (90.0..=140.0).contains(&value),
            Self::BpDiastolic => (60.0..=90.0).contains(&value),
            Self::HeartRate => (60.0..=100.0).contains(&value),
            Self::Hba1c => value < 5.7,
            Self::VitaminD => value >= 30.0,
            Self::Ldl => value < 100.0,
            Self::Iron => (60.0..=170.0).contains(&value),
            Self::Creatinine => (0.7..=1.3).contains(&value),
            Self::Mch => (27.0..=33.0).contains(&value),
            Self::Mchc => (33.0..=36.0).contains(&value),
            Self::Crp => value < 3.0,
        }
    }
}

impl std::fmt::Display for VitalSign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// Ordered sequence of named numeric vitals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Build a vector from parallel name and value sequences.
    ///
    /// # Errors
    /// Returns `SchemaError` if lengths differ or a name repeats.
    pub fn new(names: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if names.len() != values.len() {
            return Err(VitalError::Schema(format!(
                "{} feature names but {} values",
                names.len(),
                values.len()
            )));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(VitalError::Schema(format!("Duplicate feature name {name}")));
            }
        }
        Ok(Self { names, values })
    }

    /// Build a vector from `(name, value)` pairs, preserving order.
    ///
    /// # Errors
    /// Returns `SchemaError` if a name repeats.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<f64>) =
            pairs.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        Self::new(names, values)
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the named feature, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i).copied())
    }

    /// Whether this vector has exactly the given names in the given order.
    #[must_use]
    pub fn matches_schema(&self, schema: &[String]) -> bool {
        self.names == schema
    }
}

/// Typed readings for the canonical schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalReadings {
    pub age: f64,
    pub hemoglobin: f64,
    pub bp_systolic: f64,
    pub bp_diastolic: f64,
    pub heart_rate: f64,
    pub hba1c: f64,
    pub vitamin_d: f64,
    pub ldl: f64,
    pub iron: f64,
    pub creatinine: f64,
    pub mch: f64,
    pub mchc: f64,
    pub crp: f64,
}

impl Default for VitalReadings {
    /// Defaults of the entry form: an adult with unremarkable vitals.
    fn default() -> Self {
        Self {
            age: 30.0,
            hemoglobin: 14.0,
            bp_systolic: 120.0,
            bp_diastolic: 80.0,
            heart_rate: 75.0,
            hba1c: 5.5,
            vitamin_d: 30.0,
            ldl: 90.0,
            iron: 100.0,
            creatinine: 1.0,
            mch: 29.0,
            mchc: 34.0,
            crp: 1.0,
        }
    }
}

impl VitalReadings {
    /// Value of a single vital.
    #[must_use]
    pub fn value(&self, vital: VitalSign) -> f64 {
        match vital {
            VitalSign::Age => self.age,
            VitalSign::Hemoglobin => self.hemoglobin,
            VitalSign::BpSystolic => self.bp_systolic,
            VitalSign::BpDiastolic => self.bp_diastolic,
            VitalSign::HeartRate => self.heart_rate,
            VitalSign::Hba1c => self.hba1c,
            VitalSign::VitaminD => self.vitamin_d,
            VitalSign::Ldl => self.ldl,
            VitalSign::Iron => self.iron,
            VitalSign::Creatinine => self.creatinine,
            VitalSign::Mch => self.mch,
            VitalSign::Mchc => self.mchc,
            VitalSign::Crp => self.crp,
        }
    }

    fn slot(&mut self, vital: VitalSign) -> &mut f64 {
        match vital {
            VitalSign::Age => &mut self.age,
            VitalSign::Hemoglobin => &mut self.hemoglobin,
            VitalSign::BpSystolic => &mut self.bp_systolic,
            VitalSign::BpDiastolic => &mut self.bp_diastolic,
            VitalSign::HeartRate => &mut self.heart_rate,
            VitalSign::Hba1c => &mut self.hba1c,
            VitalSign::VitaminD => &mut self.vitamin_d,
            VitalSign::Ldl => &mut self.ldl,
            VitalSign::Iron => &mut self.iron,
            VitalSign::Creatinine => &mut self.creatinine,
            VitalSign::Mch => &mut self.mch,
            VitalSign::Mchc => &mut self.mchc,
            VitalSign::Crp => &mut self.crp,
        }
    }

    /// Convert to a feature vector in canonical order.
    #[must_use]
    pub fn to_feature_vector(&self) -> FeatureVector {
        FeatureVector {
            names: VitalSign::ALL.iter().map(|v| v.column().to_string()).collect(),
            values: VitalSign::ALL.iter().map(|&v| self.value(v)).collect(),
        }
    }

    /// Read canonical vitals from a feature vector (any order).
    ///
    /// # Errors
    /// Returns `SchemaError` if a canonical vital is missing.
    pub fn from_feature_vector(v: &FeatureVector) -> Result<Self> {
        let mut readings = Self::default();
        for vital in VitalSign::ALL {
            let value = v.get(vital.column()).ok_or_else(|| {
                VitalError::Schema(format!("Missing required feature {vital}"))
            })?;
            *readings.slot(vital) = value;
        }
        Ok(readings)
    }

    /// Validate that all readings are finite and within plausible input ranges.
    ///
    /// # Errors
    /// Returns validation errors as a vector of strings.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        for vital in VitalSign::ALL {
            let value = self.value(vital);
            let (lo, hi) = vital.input_range();
            if !value.is_finite() {
                errors.push(format!("{vital} is not a finite number"));
            } else if !(lo..=hi).contains(&value) {
                errors.push(format!(
                    "{vital} {value} {} out of range [{lo}, {hi}]",
                    vital.unit()
                ));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Vitals outside their clinical reference range.
    #[must_use]
    pub fn abnormal_vitals(&self, sex: Sex) -> Vec<VitalSign> {
        VitalSign::ALL
            .into_iter()
            .filter(|&v| !v.is_normal(self.value(v), sex))
            .collect()
    }

    /// Screen `v` when it carries the canonical vitals; `None` for any
    /// other schema.
    #[must_use]
    pub fn screen(v: &FeatureVector, sex: Option<Sex>) -> Option<VitalScreen> {
        let readings = Self::from_feature_vector(v).ok()?;
        let out_of_range = readings.validate().err().unwrap_or_default();
        let abnormal = match sex {
            Some(sex) => readings.abnormal_vitals(sex),
            None => {
                let female = readings.abnormal_vitals(Sex::Female);
                readings
                    .abnormal_vitals(Sex::Male)
                    .into_iter()
                    .filter(|v| female.contains(v))
                    .collect()
            }
        };
        Some(VitalScreen {
            out_of_range,
            abnormal,
        })
    }
}
