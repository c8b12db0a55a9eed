//! Domain layer: Core business types and logic.
//!
//! Pure types with strict validation: vital-sign schemas, feature scaling,
//! label encoding, prediction results, and the diet rule engine.

mod dataset;
pub mod diet;
mod labels;
mod prediction;
mod scaler;
mod vitals;

pub use dataset::{Dataset, LabeledRow};
pub use diet::{
    recommend, Adjustment, DietPlan, DietRule, Directive, DirectiveCategory, MealPlan,
    PlannedDirective, RuleTable, SuppressedDirective,
};
pub use labels::LabelSpace;
pub use prediction::{DecisionThreshold, PredictionResult, RiskLevel};
pub use scaler::ScalingParameters;
pub use vitals::{FeatureVector, Sex, VitalReadings, VitalScreen, VitalSign};
