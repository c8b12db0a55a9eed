//! Diet recommendation rules.
//!
//! A [`RuleTable`] maps disease sets to ordered dietary directives. Given the
//! positive set of a prediction, [`recommend`] selects every applicable rule,
//! orders them so that combination rules outrank single-disease rules, and
//! merges their directives. Contradictory guidance for the same nutrient is
//! never emitted silently: the losing directive is kept in
//! [`DietPlan::suppressed`] together with the rule that overrode it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, VitalError};

/// Embedded default rule table.
const BUILTIN_RULES: &str = include_str!("../../config/diet_rules.json");

/// Kind of dietary guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveCategory {
    Eat,
    Avoid,
    Supplement,
    Monitor,
    Lifestyle,
}

impl std::fmt::Display for DirectiveCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eat => write!(f, "Eat"),
            Self::Avoid => write!(f, "Avoid"),
            Self::Supplement => write!(f, "Supplement"),
            Self::Monitor => write!(f, "Monitor"),
            Self::Lifestyle => write!(f, "Lifestyle"),
        }
    }
}

/// Direction of a nutrient adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    Increase,
    Decrease,
}

/// A single piece of dietary guidance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub category: DirectiveCategory,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<Adjustment>,
}

/// Identity used to merge duplicate directives across rules.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DirectiveKey {
    Nutrient(DirectiveCategory, String, Adjustment),
    Text(DirectiveCategory, String),
}

impl Directive {
    pub fn new(category: DirectiveCategory, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
            nutrient: None,
            adjustment: None,
        }
    }

    /// Attach a nutrient target to this directive.
    #[must_use]
    pub fn targeting(mut self, nutrient: impl Into<String>, adjustment: Adjustment) -> Self {
        self.nutrient = Some(nutrient.into());
        self.adjustment = Some(adjustment);
        self
    }

    fn normalized_nutrient(&self) -> Option<String> {
        self.nutrient.as_ref().map(|n| n.trim().to_lowercase())
    }

    fn key(&self) -> DirectiveKey {
        match (self.normalized_nutrient(), self.adjustment) {
            (Some(nutrient), Some(adjustment)) => {
                DirectiveKey::Nutrient(self.category, nutrient, adjustment)
            }
            _ => DirectiveKey::Text(self.category, self.text.trim().to_lowercase()),
        }
    }

    /// Same nutrient, opposite adjustment.
    #[must_use]
    pub fn conflicts_with(&self, other: &Directive) -> bool {
        match (
            self.normalized_nutrient(),
            self.adjustment,
            other.normalized_nutrient(),
            other.adjustment,
        ) {
            (Some(a), Some(adj_a), Some(b), Some(adj_b)) => a == b && adj_a != adj_b,
            _ => false,
        }
    }
}

/// Suggested meals for one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealPlan {
    #[serde(default)]
    pub breakfast: Vec<String>,
    #[serde(default)]
    pub lunch: Vec<String>,
    #[serde(default)]
    pub dinner: Vec<String>,
    #[serde(default)]
    pub snacks: Vec<String>,
}

/// Guidance for one disease or combination of diseases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DietRule {
    pub diseases: BTreeSet<String>,
    pub priority: u32,
    pub directives: Vec<Directive>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_plan: Option<MealPlan>,
}

impl DietRule {
    /// Rule identity: the sorted disease names joined with `" + "`.
    #[must_use]
    pub fn key(&self) -> String {
        self.diseases
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" + ")
    }

    /// Number of diseases the rule requires.
    #[must_use]
    pub fn specificity(&self) -> usize {
        self.diseases.len()
    }

    fn applies_to(&self, positive: &BTreeSet<String>) -> bool {
        self.diseases.is_subset(positive)
    }
}

/// Specificity desc, priority desc, key asc.
fn rule_order(a: &DietRule, b: &DietRule) -> Ordering {
    b.specificity()
        .cmp(&a.specificity())
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.key().cmp(&b.key()))
}

#[derive(Debug, Deserialize)]
struct RuleTableFile {
    #[serde(default)]
    wellness: Vec<Directive>,
    #[serde(default)]
    default_meal_plan: Option<MealPlan>,
    rules: Vec<DietRule>,
}

/// Validated collection of diet rules.
///
/// Rules are stored pre-sorted in application order, so [`recommend`] only
/// filters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleTable {
    wellness: Vec<Directive>,
    default_meal_plan: Option<MealPlan>,
    rules: Vec<DietRule>,
}

impl RuleTable {
    /// Build and validate a rule table.
    ///
    /// Rules sharing a disease set are merged when their priorities agree.
    ///
    /// # Errors
    /// Returns `ConfigError` if a rule has no diseases or no directives, a
    /// directive has empty text, a nutrient directive lacks an adjustment
    /// (or vice versa), or two rules share a disease set with different
    /// priorities.
    pub fn new(
        wellness: Vec<Directive>,
        default_meal_plan: Option<MealPlan>,
        rules: Vec<DietRule>,
    ) -> Result<Self> {
        for directive in &wellness {
            validate_directive(directive, "wellness")?;
        }

        let mut merged: BTreeMap<String, DietRule> = BTreeMap::new();
        for rule in rules {
            if rule.diseases.is_empty() {
                return Err(VitalError::Config("Diet rule has an empty disease set".into()));
            }
            if rule.diseases.iter().any(|d| d.trim().is_empty()) {
                return Err(VitalError::Config("Diet rule names an empty disease".into()));
            }
            let key = rule.key();
            if rule.directives.is_empty() {
                return Err(VitalError::Config(format!("Diet rule {key} has no directives")));
            }
            for directive in &rule.directives {
                validate_directive(directive, &key)?;
            }

            match merged.get_mut(&key) {
                Some(existing) if existing.priority != rule.priority => {
                    return Err(VitalError::Config(format!(
                        "Diet rule {key} declared with priorities {} and {}",
                        existing.priority, rule.priority
                    )));
                }
                Some(existing) => {
                    existing.directives.extend(rule.directives);
                    if existing.meal_plan.is_none() {
                        existing.meal_plan = rule.meal_plan;
                    }
                }
                None => {
                    merged.insert(key, rule);
                }
            }
        }

        let mut rules: Vec<DietRule> = merged.into_values().collect();
        rules.sort_by(rule_order);

        tracing::debug!("Loaded diet rule table with {} rules", rules.len());

        Ok(Self {
            wellness,
            default_meal_plan,
            rules,
        })
    }

    /// Parse and validate a JSON rule table.
    ///
    /// # Errors
    /// Returns `ConfigError` for malformed JSON or an invalid table.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: RuleTableFile = serde_json::from_str(json)
            .map_err(|e| VitalError::Config(format!("Invalid diet rule table: {e}")))?;
        Self::new(file.wellness, file.default_meal_plan, file.rules)
    }

    /// Read a JSON rule table from disk.
    ///
    /// # Errors
    /// Returns `IoError` if the file cannot be read, `ConfigError` if it is
    /// invalid.
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The embedded default table.
    ///
    /// # Errors
    /// Returns `ConfigError` only if the embedded table is invalid.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_RULES)
    }

    /// Rules in application order.
    #[must_use]
    pub fn rules(&self) -> &[DietRule] {
        &self.rules
    }

    #[must_use]
    pub fn wellness(&self) -> &[Directive] {
        &self.wellness
    }

    #[must_use]
    pub fn default_meal_plan(&self) -> Option<&MealPlan> {
        self.default_meal_plan.as_ref()
    }

    /// Every disease named by at least one rule.
    #[must_use]
    pub fn known_diseases(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .flat_map(|r| r.diseases.iter().map(String::as_str))
            .collect()
    }
}

fn validate_directive(directive: &Directive, owner: &str) -> Result<()> {
    if directive.text.trim().is_empty() {
        return Err(VitalError::Config(format!(
            "Diet rule {owner} has a directive with empty text"
        )));
    }
    match (&directive.nutrient, directive.adjustment) {
        (Some(n), Some(_)) if n.trim().is_empty() => Err(VitalError::Config(format!(
            "Diet rule {owner} has a directive with an empty nutrient"
        ))),
        (Some(_), None) => Err(VitalError::Config(format!(
            "Diet rule {owner}: nutrient directive \"{}\" lacks an adjustment",
            directive.text
        ))),
        (None, Some(_)) => Err(VitalError::Config(format!(
            "Diet rule {owner}: directive \"{}\" has an adjustment but no nutrient",
            directive.text
        ))),
        _ => Ok(()),
    }
}

/// An accepted directive and every rule that asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedDirective {
    pub directive: Directive,
    pub sources: Vec<String>,
}

/// A directive dropped because a higher-ranked rule contradicts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressedDirective {
    pub directive: Directive,
    pub source: String,
    pub overridden_by: String,
}

/// Merged guidance for a set of positive conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DietPlan {
    pub conditions: BTreeSet<String>,
    pub directives: Vec<PlannedDirective>,
    pub suppressed: Vec<SuppressedDirective>,
    pub applied_rules: Vec<String>,
    /// Positive conditions with no matching rule.
    pub uncovered: BTreeSet<String>,
    pub meal_plan: Option<MealPlan>,
    /// No rule applied, so only general wellness guidance is given. Also set
    /// when every condition is uncovered; check `conditions` to tell the two
    /// apart.
    pub wellness: bool,
}

impl DietPlan {
    /// Accepted directives of one category, in plan order.
    pub fn by_category(&self, category: DirectiveCategory) -> impl Iterator<Item = &Directive> {
        self.directives
            .iter()
            .map(|p| &p.directive)
            .filter(move |d| d.category == category)
    }

    /// One-line summary of what the plan is for.
    #[must_use]
    pub fn headline(&self) -> String {
        if self.conditions.is_empty() {
            "No disease detected. General wellness guidance:".to_string()
        } else if self.wellness {
            let names: Vec<&str> = self.uncovered.iter().map(String::as_str).collect();
            format!("No diet rule for: {}. General wellness guidance:", names.join(", "))
        } else {
            format!("Diet plan for: {}", self.applied_rules.join(", "))
        }
    }
}

/// Derive a diet plan from a positive disease set.
///
/// Deterministic: the same set and table always yield the same plan.
#[must_use]
pub fn recommend(positive: &BTreeSet<String>, table: &RuleTable) -> DietPlan {
    let applicable: Vec<&DietRule> = table
        .rules
        .iter()
        .filter(|r| r.applies_to(positive))
        .collect();

    let mut accepted: Vec<PlannedDirective> = Vec::new();
    let mut suppressed = Vec::new();
    let mut applied_rules = Vec::with_capacity(applicable.len());

    for rule in &applicable {
        let rule_key = rule.key();
        for directive in &rule.directives {
            if let Some(winner) = accepted.iter().find(|a| a.directive.conflicts_with(directive)) {
                suppressed.push(SuppressedDirective {
                    directive: directive.clone(),
                    source: rule_key.clone(),
                    overridden_by: winner.sources[0].clone(),
                });
                continue;
            }

            let key = directive.key();
            match accepted.iter_mut().find(|a| a.directive.key() == key) {
                Some(existing) => {
                    if !existing.sources.contains(&rule_key) {
                        existing.sources.push(rule_key.clone());
                    }
                }
                None => accepted.push(PlannedDirective {
                    directive: directive.clone(),
                    sources: vec![rule_key.clone()],
                }),
            }
        }
        applied_rules.push(rule_key);
    }

    let wellness = applicable.is_empty();
    if wellness {
        accepted = table
            .wellness
            .iter()
            .map(|d| PlannedDirective {
                directive: d.clone(),
                sources: vec!["wellness".to_string()],
            })
            .collect();
    }

    let meal_plan = applicable
        .iter()
        .find_map(|r| r.meal_plan.clone())
        .or_else(|| table.default_meal_plan.clone());

    let uncovered = positive
        .iter()
        .filter(|d| !applicable.iter().any(|r| r.diseases.contains(*d)))
        .cloned()
        .collect();

    if !suppressed.is_empty() {
        tracing::debug!("Suppressed {} conflicting diet directives", suppressed.len());
    }

    DietPlan {
        conditions: positive.clone(),
        directives: accepted,
        suppressed,
        applied_rules,
        uncovered,
        meal_plan,
        wellness,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn rule(diseases: &[&str], priority: u32, directives: Vec<Directive>) -> DietRule {
        DietRule {
            diseases: set(diseases),
            priority,
            directives,
            meal_plan: None,
        }
    }

    fn potassium(adjustment: Adjustment) -> Directive {
        let text = match adjustment {
            Adjustment::Increase => "Eat potassium-rich foods",
            Adjustment::Decrease => "Limit potassium",
        };
        Directive::new(DirectiveCategory::Eat, text).targeting("potassium", adjustment)
    }

    fn table() -> RuleTable {
        RuleTable::new(
            vec![Directive::new(DirectiveCategory::Eat, "Eat vegetables")],
            None,
            vec![
                rule(&["Hypertension"], 60, vec![potassium(Adjustment::Increase)]),
                rule(&["Kidney Disease"], 50, vec![potassium(Adjustment::Decrease)]),
                rule(
                    &["Hypertension", "Kidney Disease"],
                    10,
                    vec![Directive::new(DirectiveCategory::Monitor, "See a nephrologist")],
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_combination_rule_outranks_single_rules() {
        let plan = recommend(&set(&["Hypertension", "Kidney Disease"]), &table());
        assert_eq!(
            plan.applied_rules,
            vec!["Hypertension + Kidney Disease", "Hypertension", "Kidney Disease"]
        );
    }

    #[test]
    fn test_conflict_is_suppressed_not_dropped() {
        let plan = recommend(&set(&["Hypertension", "Kidney Disease"]), &table());
        // Hypertension has higher priority, so its increase wins.
        assert!(plan
            .directives
            .iter()
            .any(|p| p.directive.adjustment == Some(Adjustment::Increase)));
        assert_eq!(plan.suppressed.len(), 1);
        assert_eq!(plan.suppressed[0].source, "Kidney Disease");
        assert_eq!(plan.suppressed[0].overridden_by, "Hypertension");
    }

    #[test]
    fn test_no_plan_contains_both_sides_of_a_conflict() {
        let plan = recommend(&set(&["Hypertension", "Kidney Disease"]), &RuleTable::builtin().unwrap());
        for (i, a) in plan.directives.iter().enumerate() {
            for b in &plan.directives[i + 1..] {
                assert!(!a.directive.conflicts_with(&b.directive));
            }
        }
    }

    #[test]
    fn test_builtin_kidney_hypertension_limits_potassium() {
        let plan = recommend(&set(&["Hypertension", "Kidney Disease"]), &RuleTable::builtin().unwrap());
        assert_eq!(plan.applied_rules[0], "Hypertension + Kidney Disease");
        let potassium: Vec<_> = plan
            .directives
            .iter()
            .filter(|p| p.directive.nutrient.as_deref() == Some("potassium"))
            .collect();
        assert!(!potassium.is_empty());
        assert!(potassium
            .iter()
            .all(|p| p.directive.adjustment == Some(Adjustment::Decrease)));
        assert!(plan.suppressed.iter().any(|s| s.source == "Hypertension"
            && s.overridden_by == "Hypertension + Kidney Disease"));
    }

    #[test]
    fn test_empty_positive_set_gives_wellness() {
        let plan = recommend(&BTreeSet::new(), &table());
        assert!(plan.wellness);
        assert!(plan.applied_rules.is_empty());
        assert_eq!(plan.directives.len(), 1);
    }

    #[test]
    fn test_unknown_disease_contributes_nothing() {
        let plan = recommend(&set(&["Gout"]), &table());
        assert!(plan.applied_rules.is_empty());
        assert_eq!(plan.uncovered, set(&["Gout"]));

        let with_known = recommend(&set(&["Gout", "Hypertension"]), &table());
        let without = recommend(&set(&["Hypertension"]), &table());
        assert_eq!(with_known.directives, without.directives);
    }

    #[test]
    fn test_uncovered_only_set_is_not_reported_as_healthy() {
        let table = RuleTable::builtin().unwrap();
        let plan = recommend(&set(&["Obesity"]), &table);
        assert_eq!(plan.conditions, set(&["Obesity"]));
        assert_eq!(plan.uncovered, set(&["Obesity"]));
        assert!(plan.wellness);
        assert_eq!(plan.directives.len(), table.wellness().len());

        let headline = plan.headline();
        assert!(!headline.contains("No disease detected"));
        assert!(headline.contains("Obesity"));

        let healthy = recommend(&BTreeSet::new(), &table);
        assert!(healthy.headline().starts_with("No disease detected"));

        let anemia = recommend(&set(&["Anemia"]), &table);
        assert_eq!(anemia.headline(), "Diet plan for: Anemia");
    }

    #[test]
    fn test_duplicate_directives_are_merged() {
        let iron = Directive::new(DirectiveCategory::Eat, "Iron-rich foods")
            .targeting("iron", Adjustment::Increase);
        let table = RuleTable::new(
            vec![],
            None,
            vec![
                rule(&["Anemia"], 40, vec![iron.clone()]),
                rule(&["Iron Deficiency"], 30, vec![iron]),
            ],
        )
        .unwrap();
        let plan = recommend(&set(&["Anemia", "Iron Deficiency"]), &table);
        assert_eq!(plan.directives.len(), 1);
        assert_eq!(plan.directives[0].sources, vec!["Anemia", "Iron Deficiency"]);
    }

    #[test]
    fn test_equal_priority_tie_breaks_on_key() {
        let table = RuleTable::new(
            vec![],
            None,
            vec![
                rule(&["B"], 5, vec![potassium(Adjustment::Decrease)]),
                rule(&["A"], 5, vec![potassium(Adjustment::Increase)]),
            ],
        )
        .unwrap();
        let plan = recommend(&set(&["A", "B"]), &table);
        assert_eq!(plan.suppressed[0].overridden_by, "A");
    }

    #[test]
    fn test_recommend_is_deterministic() {
        let table = RuleTable::builtin().unwrap();
        let positive = set(&["Anemia", "Diabetes", "Heart Disease", "Kidney Disease"]);
        assert_eq!(recommend(&positive, &table), recommend(&positive, &table));
    }

    #[test]
    fn test_duplicate_key_with_different_priority_is_config_error() {
        let err = RuleTable::new(
            vec![],
            None,
            vec![
                rule(&["Anemia"], 40, vec![potassium(Adjustment::Increase)]),
                rule(&["Anemia"], 41, vec![potassium(Adjustment::Increase)]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, VitalError::Config(_)));
    }

    #[test]
    fn test_same_priority_duplicates_merge() {
        let table = RuleTable::new(
            vec![],
            None,
            vec![
                rule(&["Anemia"], 40, vec![potassium(Adjustment::Increase)]),
                rule(
                    &["Anemia"],
                    40,
                    vec![Directive::new(DirectiveCategory::Monitor, "Recheck hemoglobin")],
                ),
            ],
        )
        .unwrap();
        assert_eq!(table.rules().len(), 1);
        assert_eq!(table.rules()[0].directives.len(), 2);
    }

    #[test]
    fn test_invalid_rules_are_config_errors() {
        let empty_set = rule(&[], 1, vec![potassium(Adjustment::Increase)]);
        assert!(RuleTable::new(vec![], None, vec![empty_set]).is_err());

        let no_directives = rule(&["Anemia"], 1, vec![]);
        assert!(RuleTable::new(vec![], None, vec![no_directives]).is_err());

        let mut half_target = potassium(Adjustment::Increase);
        half_target.adjustment = None;
        assert!(RuleTable::new(vec![], None, vec![rule(&["Anemia"], 1, vec![half_target])]).is_err());

        let blank = Directive::new(DirectiveCategory::Eat, "   ");
        assert!(RuleTable::new(vec![], None, vec![rule(&["Anemia"], 1, vec![blank])]).is_err());
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(matches!(
            RuleTable::from_json("{\"rules\": 3}"),
            Err(VitalError::Config(_))
        ));
    }

    #[test]
    fn test_builtin_table_is_valid() {
        let table = RuleTable::builtin().unwrap();
        let known = table.known_diseases();
        for disease in [
            "Anemia",
            "Hypertension",
            "Diabetes",
            "Heart Disease",
            "Vitamin D Deficiency",
            "Kidney Disease",
            "High Cholesterol",
            "Iron Deficiency",
        ] {
            assert!(known.contains(disease), "missing rule for {disease}");
        }
        assert!(table.default_meal_plan().is_some());
        assert!(!table.wellness().is_empty());
    }

    #[test]
    fn test_builtin_anemia_recommends_iron() {
        let plan = recommend(&set(&["Anemia"]), &RuleTable::builtin().unwrap());
        assert!(!plan.wellness);
        assert!(plan
            .by_category(DirectiveCategory::Eat)
            .any(|d| d.nutrient.as_deref() == Some("iron")));
        assert!(plan.meal_plan.is_some());
    }

    #[test]
    fn test_meal_plan_falls_back_to_default() {
        let table = RuleTable::builtin().unwrap();
        let plan = recommend(&set(&["Vitamin D Deficiency"]), &table);
        assert_eq!(plan.meal_plan.as_ref(), table.default_meal_plan());
    }
}
