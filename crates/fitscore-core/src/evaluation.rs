//! Raw measurement grading and composite scoring.
//!
//! A resolved [`GradingRule`] turns one raw value into a [`Tier`] and a
//! deterministic score inside that tier's band. Scored items are then folded
//! into a [`CompositeTotal`] for the student-year record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::StandardCatalog;
use crate::error::EngineError;
use crate::model::{GradingRule, Item, MeasurementRecord, RecordId, StudentId, Tier};

/// Per-item weights for the composite total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemWeights(pub BTreeMap<Item, f64>);

impl ItemWeights {
    /// Weights of the national student fitness standard.
    ///
    /// Sit-ups and pull-ups are gender alternatives, so any one student's
    /// applicable weights add up to 1.0.
    pub fn national_standard() -> Self {
        Self(BTreeMap::from([
            (Item::Bmi, 0.15),
            (Item::VitalCapacity, 0.15),
            (Item::Sprint50m, 0.20),
            (Item::SitAndReach, 0.10),
            (Item::StandingLongJump, 0.10),
            (Item::SitUps, 0.10),
            (Item::PullUps, 0.10),
            (Item::EnduranceRun, 0.20),
        ]))
    }

    /// Weight of `item`; unlisted items weigh nothing.
    pub fn get(&self, item: Item) -> f64 {
        self.0.get(&item).copied().unwrap_or(0.0)
    }
}

/// Tunables for the evaluation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Weighted sum when set, plain sum when `None`. Defaults to
    /// [`ItemWeights::national_standard`].
    #[serde(default = "default_weights")]
    pub weights: Option<ItemWeights>,
    /// Overrides of [`Item::sanity_range`].
    #[serde(default)]
    pub sanity: BTreeMap<Item, (f64, f64)>,
}

fn default_weights() -> Option<ItemWeights> {
    Some(ItemWeights::national_standard())
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            sanity: BTreeMap::new(),
        }
    }
}

impl EvaluationConfig {
    /// Unweighted composites.
    pub fn plain_sum() -> Self {
        Self {
            weights: None,
            ..Self::default()
        }
    }

    pub fn sanity_range(&self, item: Item) -> (f64, f64) {
        self.sanity
            .get(&item)
            .copied()
            .unwrap_or_else(|| item.sanity_range())
    }
}

/// Grade and score of one item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemScore {
    pub tier: Tier,
    pub score: f64,
}

/// Reject non-finite values and values outside the item's hard sanity range.
pub fn check_value(item: Item, value: f64, config: &EvaluationConfig) -> Result<f64, EngineError> {
    if !value.is_finite() {
        return Err(EngineError::InvalidMeasurement {
            item,
            value,
            reason: "not a finite number".into(),
        });
    }
    let (min, max) = config.sanity_range(item);
    if value < min || value > max {
        return Err(EngineError::InvalidMeasurement {
            item,
            value,
            reason: format!("outside sanity range [{min}, {max}]"),
        });
    }
    Ok(value)
}

/// Qualitative grade of `raw` under `rule`.
///
/// Tiers are tried best-first; a missing threshold never matches and the
/// value cascades to the next tier.
pub fn grade_of(rule: &GradingRule, raw: f64) -> Tier {
    rule.thresholds()
        .into_iter()
        .find_map(|(tier, threshold)| {
            threshold
                .filter(|&t| rule.reaches(raw, t))
                .map(|_| tier)
        })
        .unwrap_or(Tier::Fail)
}

/// Grade and in-band score of `raw` under `rule`.
///
/// The score is the tier's band floor plus the linear position of `raw`
/// between the tier's boundaries, rounded to one decimal.
pub fn score_of(rule: &GradingRule, raw: f64) -> ItemScore {
    let tier = grade_of(rule, raw);
    let (low, high) = tier.score_band();
    let score = low + tier_position(rule, tier, raw) * (high - low);
    ItemScore {
        tier,
        score: round_to(score, 1),
    }
}

/// Position of `raw` inside its tier, in `[0, 1]`.
///
/// Excellent extends one neighbouring band width past its threshold, Fail one
/// neighbouring band width below the worst present threshold.
fn tier_position(rule: &GradingRule, tier: Tier, raw: f64) -> f64 {
    let present: Vec<(Tier, f64)> = rule
        .thresholds()
        .into_iter()
        .filter_map(|(t, v)| v.map(|v| (t, v)))
        .collect();

    if tier == Tier::Fail {
        let Some(&(_, floor)) = present.last() else {
            return 0.0;
        };
        return match present.len().checked_sub(2) {
            Some(i) => {
                let width = present[i].1 - floor;
                position(raw, floor - width, floor)
            }
            None => 0.0,
        };
    }

    let Some(idx) = present.iter().position(|(t, _)| *t == tier) else {
        return 0.0;
    };
    let lower = present[idx].1;
    let upper = if idx > 0 {
        Some(present[idx - 1].1)
    } else {
        present.get(1).map(|&(_, worse)| lower + (lower - worse))
    };
    upper.map_or(0.0, |upper| position(raw, lower, upper))
}

fn position(value: f64, from: f64, to: f64) -> f64 {
    let span = to - from;
    if span.abs() < f64::EPSILON || !span.is_finite() {
        return 0.0;
    }
    ((value - from) / span).clamp(0.0, 1.0)
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Combined score of one student-year record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeTotal {
    /// Sum (or weighted sum) of the scored items.
    pub total: f64,
    /// How many items contributed.
    pub scored_items: usize,
    /// Sum of the weights of the contributing items (equals `scored_items` when unweighted).
    pub weight_sum: f64,
}

impl CompositeTotal {
    /// `total / weight_sum`, or `0` when nothing was weighted.
    pub fn normalized(&self) -> f64 {
        if self.weight_sum > 0.0 {
            self.total / self.weight_sum
        } else {
            0.0
        }
    }

    /// The 0-100 composite score stored on the record, ranked and banded.
    ///
    /// This is the weighted mean of the scored items, so missing items do
    /// not drag the score down and a plain sum becomes the item average.
    /// `None` when every scored item weighs nothing.
    pub fn score(&self) -> Option<f64> {
        (self.weight_sum > 0.0).then(|| round_to(self.normalized(), 2))
    }
}

/// Fold item scores into a composite. `None` when no item was scored.
///
/// Missing items are simply absent from `scores`; they neither add to the
/// total nor to `weight_sum`.
pub fn composite_total(
    scores: &[(Item, f64)],
    weights: Option<&ItemWeights>,
) -> Option<CompositeTotal> {
    if scores.is_empty() {
        return None;
    }
    let (total, weight_sum) = scores.iter().fold((0.0, 0.0), |(total, sum), &(item, score)| {
        let w = weights.map_or(1.0, |w| w.get(item));
        (total + w * score, sum + w)
    });
    Some(CompositeTotal {
        total: round_to(total, 2),
        scored_items: scores.len(),
        weight_sum: round_to(weight_sum, 4),
    })
}

/// What happened to one submitted item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Scored {
        tier: Tier,
        score: f64,
        rule_id: u64,
    },
    /// No grading rule applies; the item is left out of the composite.
    NotApplicable,
    /// The raw value was rejected; the rest of the record is still scored.
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEvaluation {
    pub item: Item,
    pub raw: f64,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// A record with every submitted item graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record_id: RecordId,
    pub student_id: StudentId,
    pub year: i32,
    pub items: Vec<ItemEvaluation>,
    /// `None` when no item could be scored.
    pub composite: Option<CompositeTotal>,
}

impl ScoredRecord {
    pub fn scored(&self) -> impl Iterator<Item = (&ItemEvaluation, Tier, f64)> {
        self.items.iter().filter_map(|e| match e.outcome {
            ItemOutcome::Scored { tier, score, .. } => Some((e, tier, score)),
            _ => None,
        })
    }

    /// Item-level problems collected during evaluation.
    pub fn issues(&self, record: &MeasurementRecord) -> Vec<EngineError> {
        self.items
            .iter()
            .filter_map(|e| match &e.outcome {
                ItemOutcome::Scored { .. } => None,
                ItemOutcome::NotApplicable => Some(EngineError::NotApplicableStandard {
                    item: e.item,
                    year: record.year,
                    grade: record.grade_id,
                    gender: record.gender,
                }),
                ItemOutcome::Invalid { reason } => Some(EngineError::InvalidMeasurement {
                    item: e.item,
                    value: e.raw,
                    reason: reason.clone(),
                }),
            })
            .collect()
    }

    /// Copy of `record` carrying this evaluation's composite score. Ranks are kept.
    pub fn apply_to(&self, record: &MeasurementRecord) -> MeasurementRecord {
        MeasurementRecord {
            composite_total: self.composite.and_then(|c| c.score()),
            ..record.clone()
        }
    }
}

/// Grades whole records against a catalog. Pure and stateless.
pub struct Evaluator<'a> {
    catalog: &'a StandardCatalog,
    config: &'a EvaluationConfig,
}

impl<'a> Evaluator<'a> {
    pub fn new(catalog: &'a StandardCatalog, config: &'a EvaluationConfig) -> Self {
        Self { catalog, config }
    }

    /// Grade every submitted item of `record` and combine the results.
    pub fn evaluate(&self, record: &MeasurementRecord) -> ScoredRecord {
        let mut items = Vec::new();
        let mut scores = Vec::new();

        for item in Item::ALL {
            let Some(raw) = record.measurements.effective(item) else {
                continue;
            };
            let outcome = match self.evaluate_item(record, item, raw) {
                Ok((rule_id, s)) => {
                    scores.push((item, s.score));
                    ItemOutcome::Scored {
                        tier: s.tier,
                        score: s.score,
                        rule_id,
                    }
                }
                Err(EngineError::NotApplicableStandard { .. }) => ItemOutcome::NotApplicable,
                Err(e) => {
                    tracing::warn!(record = record.id, %item, "rejected measurement: {e}");
                    ItemOutcome::Invalid {
                        reason: e.to_string(),
                    }
                }
            };
            items.push(ItemEvaluation { item, raw, outcome });
        }

        ScoredRecord {
            record_id: record.id,
            student_id: record.student_id,
            year: record.year,
            items,
            composite: composite_total(&scores, self.config.weights.as_ref()),
        }
    }

    fn evaluate_item(
        &self,
        record: &MeasurementRecord,
        item: Item,
        raw: f64,
    ) -> Result<(u64, ItemScore), EngineError> {
        let raw = check_value(item, raw, self.config)?;
        let rule =
            self.catalog
                .resolve_or_err(record.year, record.grade_id, record.gender, item)?;
        Ok((rule.id, score_of(rule, raw)))
    }

    /// Tier of one raw value for the record's scope, if a rule applies and the value is sane.
    pub fn item_tier(&self, record: &MeasurementRecord, item: Item, raw: f64) -> Option<Tier> {
        self.evaluate_item(record, item, raw)
            .ok()
            .map(|(_, s)| s.tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gender, Measurements};
    use chrono::Utc;

    fn rule(
        item: Item,
        excellent: Option<f64>,
        good: Option<f64>,
        pass: Option<f64>,
        is_time_based: bool,
    ) -> GradingRule {
        GradingRule {
            id: 1,
            year: 2024,
            grade_min: 1,
            grade_max: 12,
            gender: Gender::Male,
            item,
            excellent,
            good,
            pass,
            is_time_based,
            unit: item.default_unit().into(),
            active: true,
            created_at: Utc::now(),
        }
    }

    fn distance_rule() -> GradingRule {
        rule(Item::SitUps, Some(90.0), Some(80.0), Some(60.0), false)
    }

    fn sprint_rule() -> GradingRule {
        rule(Item::Sprint50m, Some(8.0), Some(8.5), Some(9.0), true)
    }

    fn record(measurements: Measurements) -> MeasurementRecord {
        MeasurementRecord {
            id: 7,
            student_id: 70,
            year: 2024,
            gender: Gender::Male,
            class_id: 1,
            grade_id: 8,
            measurements,
            composite_total: None,
            class_rank: None,
            grade_rank: None,
        }
    }

    #[test]
    fn good_tier_for_value_between_thresholds() {
        let s = score_of(&distance_rule(), 85.0);
        assert_eq!(s.tier, Tier::Good);
        assert!((80.0..=89.0).contains(&s.score), "got {}", s.score);
        assert_eq!(s.score, 84.5);
    }

    #[test]
    fn time_based_lower_is_better() {
        let r = sprint_rule();
        assert_eq!(grade_of(&r, 8.2), Tier::Good);
        assert_eq!(grade_of(&r, 7.9), Tier::Excellent);
        assert_eq!(grade_of(&r, 8.0), Tier::Excellent);
        assert_eq!(grade_of(&r, 9.0), Tier::Pass);
        assert_eq!(grade_of(&r, 9.1), Tier::Fail);
    }

    #[test]
    fn missing_threshold_cascades() {
        let r = rule(Item::SitUps, None, Some(80.0), Some(60.0), false);
        assert_eq!(grade_of(&r, 99.0), Tier::Good);
        let r = rule(Item::SitUps, None, None, None, false);
        assert_eq!(grade_of(&r, 99.0), Tier::Fail);
        assert_eq!(score_of(&r, 99.0).score, 0.0);
    }

    #[test]
    fn grade_is_monotonic_in_raw_value() {
        let up = distance_rule();
        let down = sprint_rule();
        let mut prev_up = Tier::Fail;
        let mut prev_down = Tier::Excellent;
        for step in 0..=400 {
            let v = step as f64 * 0.25;
            let t = grade_of(&up, v);
            assert!(t >= prev_up, "non-monotonic at {v}");
            prev_up = t;

            let v = 6.0 + step as f64 * 0.01;
            let t = grade_of(&down, v);
            assert!(t <= prev_down, "non-monotonic at {v}");
            prev_down = t;
        }
    }

    #[test]
    fn scores_stay_inside_tier_bands() {
        let r = distance_rule();
        for step in 0..=240 {
            let v = step as f64 * 0.5;
            let s = score_of(&r, v);
            let (low, high) = s.tier.score_band();
            assert!(s.score >= low && s.score <= high, "{v} -> {s:?}");
        }
    }

    #[test]
    fn score_is_deterministic_and_monotonic() {
        let r = sprint_rule();
        let mut prev = f64::INFINITY;
        for step in 0..=300 {
            let v = 7.0 + step as f64 * 0.01;
            let a = score_of(&r, v);
            let b = score_of(&r, v);
            assert_eq!(a, b);
            assert!(a.score <= prev, "score rose at {v}");
            prev = a.score;
        }
    }

    #[test]
    fn excellent_caps_at_hundred_and_fail_floors_at_zero() {
        let r = distance_rule();
        assert_eq!(score_of(&r, 100.0).score, 100.0);
        assert_eq!(score_of(&r, 95.0).score, 95.0);
        assert_eq!(score_of(&r, 0.0).score, 0.0);
        assert_eq!(score_of(&r, 50.0).score, 29.5);
    }

    #[test]
    fn composite_plain_sum_counts_items() {
        let c = composite_total(&[(Item::SitUps, 84.5), (Item::Sprint50m, 70.0)], None).unwrap();
        assert_eq!(c.total, 154.5);
        assert_eq!(c.scored_items, 2);
        assert_eq!(c.weight_sum, 2.0);
        assert_eq!(c.normalized(), 77.25);
    }

    #[test]
    fn composite_weighted_sum() {
        let weights = ItemWeights::national_standard();
        let c = composite_total(
            &[(Item::Sprint50m, 80.0), (Item::SitAndReach, 60.0)],
            Some(&weights),
        )
        .unwrap();
        assert_eq!(c.total, 22.0);
        assert_eq!(c.weight_sum, 0.3);
        assert!((c.normalized() - 73.333).abs() < 0.01);
    }

    #[test]
    fn composite_empty_is_none() {
        assert!(composite_total(&[], None).is_none());
    }

    #[test]
    fn evaluate_collects_partial_results() {
        let catalog = StandardCatalog::new(vec![distance_rule(), sprint_rule()]);
        let config = EvaluationConfig::plain_sum();
        let rec = record(Measurements {
            sit_ups: Some(85.0),
            sprint_50m: Some(99.0),
            pull_ups: Some(10.0),
            ..Default::default()
        });

        let scored = Evaluator::new(&catalog, &config).evaluate(&rec);
        assert_eq!(scored.items.len(), 3);
        assert_eq!(scored.scored().count(), 1);

        let composite = scored.composite.unwrap();
        assert_eq!(composite.total, 84.5);
        assert_eq!(composite.scored_items, 1);

        let issues = scored.issues(&rec);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|e| e.is_item_level()));
        assert!(issues
            .iter()
            .any(|e| matches!(e, EngineError::InvalidMeasurement { item: Item::Sprint50m, .. })));
        assert!(issues
            .iter()
            .any(|e| matches!(e, EngineError::NotApplicableStandard { item: Item::PullUps, .. })));

        let updated = scored.apply_to(&rec);
        assert_eq!(updated.composite_total, Some(84.5));
    }

    #[test]
    fn composite_score_stays_on_hundred_scale() {
        let catalog = StandardCatalog::new(vec![distance_rule(), sprint_rule()]);
        let rec = record(Measurements {
            sit_ups: Some(65.0),
            sprint_50m: Some(8.7),
            ..Default::default()
        });

        let weighted = Evaluator::new(&catalog, &EvaluationConfig::default()).evaluate(&rec);
        let c = weighted.composite.unwrap();
        assert_eq!(c.weight_sum, 0.3);
        assert_eq!(c.score(), Some(69.2));
        assert_eq!(Tier::from_score(c.score().unwrap()), Tier::Pass);

        let plain = Evaluator::new(&catalog, &EvaluationConfig::plain_sum()).evaluate(&rec);
        let c = plain.composite.unwrap();
        assert_eq!(c.total, 136.2);
        assert_eq!(c.score(), Some(68.1));
        assert_eq!(plain.apply_to(&rec).composite_total, Some(68.1));
    }

    #[test]
    fn unweighted_items_give_no_score() {
        let weights = ItemWeights::national_standard();
        let c = composite_total(&[(Item::Height, 80.0)], Some(&weights)).unwrap();
        assert_eq!(c.weight_sum, 0.0);
        assert_eq!(c.score(), None);
    }

    #[test]
    fn default_config_uses_national_weights() {
        assert_eq!(
            EvaluationConfig::default().weights,
            Some(ItemWeights::national_standard())
        );
        let parsed: EvaluationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, EvaluationConfig::default());
    }

    #[test]
    fn evaluate_without_any_rule_has_no_composite() {
        let catalog = StandardCatalog::default();
        let config = EvaluationConfig::default();
        let rec = record(Measurements {
            height: Some(170.0),
            ..Default::default()
        });
        let scored = Evaluator::new(&catalog, &config).evaluate(&rec);
        assert!(scored.composite.is_none());
        assert_eq!(scored.items[0].outcome, ItemOutcome::NotApplicable);
    }

    #[test]
    fn sanity_overrides_apply() {
        let mut config = EvaluationConfig::default();
        assert!(check_value(Item::PullUps, 150.0, &config).is_err());
        config.sanity.insert(Item::PullUps, (0.0, 200.0));
        assert!(check_value(Item::PullUps, 150.0, &config).is_ok());
        assert!(check_value(Item::PullUps, f64::NAN, &config).is_err());
    }
}
