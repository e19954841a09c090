//! Grading standard catalog and rule resolution.

use anyhow::Context;

use crate::error::EngineError;
use crate::model::{Gender, GradeId, GradingRule, Item, Tier};
use crate::traits::{RuleFilter, RuleStore};

/// An in-memory index of grading rules that resolves the applicable one.
///
/// Build it once per request from whatever `RuleStore` returned; resolution
/// is pure and never touches storage.
#[derive(Debug, Clone, Default)]
pub struct StandardCatalog {
    rules: Vec<GradingRule>,
}

impl StandardCatalog {
    /// Accepts overlapping rules; `resolve` picks the most recently created.
    pub fn new(rules: Vec<GradingRule>) -> Self {
        Self { rules }
    }

    /// Rejects rules with broken thresholds and overlapping active rules.
    pub fn strict(rules: Vec<GradingRule>) -> Result<Self, EngineError> {
        for rule in &rules {
            validate_rule(rule)?;
        }
        let catalog = Self { rules };
        if let Some(&(first, second)) = catalog.overlaps().first() {
            return Err(EngineError::OverlappingRules { first, second });
        }
        Ok(catalog)
    }

    pub fn rules(&self) -> &[GradingRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The applicable rule, or `None` if the item is ungraded for this key.
    ///
    /// Among several matching active rules the latest `created_at` wins; equal
    /// timestamps fall back to the higher rule id.
    pub fn resolve(
        &self,
        year: i32,
        grade: GradeId,
        gender: Gender,
        item: Item,
    ) -> Option<&GradingRule> {
        self.rules
            .iter()
            .filter(|r| r.matches(year, grade, gender, item))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
    }

    /// Like [`resolve`](Self::resolve), with the miss reported as an error value.
    pub fn resolve_or_err(
        &self,
        year: i32,
        grade: GradeId,
        gender: Gender,
        item: Item,
    ) -> Result<&GradingRule, EngineError> {
        self.resolve(year, grade, gender, item)
            .ok_or(EngineError::NotApplicableStandard {
                item,
                year,
                grade,
                gender,
            })
    }

    /// Pairs of active rule ids that compete for at least one lookup key.
    pub fn overlaps(&self) -> Vec<(u64, u64)> {
        let active: Vec<&GradingRule> = self.rules.iter().filter(|r| r.active).collect();
        let mut pairs = Vec::new();
        for (i, a) in active.iter().enumerate() {
            for b in &active[i + 1..] {
                if a.overlaps(b) {
                    pairs.push((a.id.min(b.id), a.id.max(b.id)));
                }
            }
        }
        pairs.sort_unstable();
        pairs
    }
}

/// Fetch the active rules of `year` and index them.
///
/// In strict mode broken or overlapping rules fail the load; otherwise
/// broken rules are logged and dropped, and overlaps are logged and
/// resolved by recency.
pub async fn load_catalog(
    store: &dyn RuleStore,
    year: i32,
    strict: bool,
) -> Result<StandardCatalog, EngineError> {
    let rules = store
        .fetch_grading_rules(&RuleFilter::for_year(year))
        .await
        .with_context(|| format!("fetching grading rules for {year}"))?;
    if strict {
        return StandardCatalog::strict(rules);
    }
    let rules = rules
        .into_iter()
        .filter(|rule| match validate_rule(rule) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(year, rule = rule.id, "skipping grading rule: {e}");
                false
            }
        })
        .collect();
    let catalog = StandardCatalog::new(rules);
    for (first, second) in catalog.overlaps() {
        tracing::warn!(year, first, second, "overlapping grading rules, newest wins");
    }
    Ok(catalog)
}

impl GradingRule {
    /// See [`validate_rule`].
    pub fn validate(&self) -> Result<(), EngineError> {
        validate_rule(self)
    }
}

/// Check threshold ordering and grade range of one rule.
///
/// Missing thresholds are skipped; the present ones must be ordered from
/// best to worst in the rule's direction.
pub fn validate_rule(rule: &GradingRule) -> Result<(), EngineError> {
    let invalid = |message: String| EngineError::InvalidRule {
        rule_id: rule.id,
        message,
    };

    if rule.grade_min > rule.grade_max {
        return Err(invalid(format!(
            "grade_min {} exceeds grade_max {}",
            rule.grade_min, rule.grade_max
        )));
    }

    let present: Vec<(Tier, f64)> = rule
        .thresholds()
        .into_iter()
        .filter_map(|(tier, t)| t.map(|v| (tier, v)))
        .collect();

    for &(tier, value) in &present {
        if !value.is_finite() {
            return Err(invalid(format!("{tier} threshold is not a finite number")));
        }
    }

    for pair in present.windows(2) {
        let (better_tier, better) = pair[0];
        let (worse_tier, worse) = pair[1];
        let ordered = if rule.is_time_based {
            better <= worse
        } else {
            better >= worse
        };
        if !ordered {
            let op = if rule.is_time_based { "<=" } else { ">=" };
            return Err(invalid(format!(
                "{better_tier} threshold {better} must be {op} {worse_tier} threshold {worse}"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn rule(id: u64, grade_min: GradeId, grade_max: GradeId, age_days: i64) -> GradingRule {
        GradingRule {
            id,
            year: 2024,
            grade_min,
            grade_max,
            gender: Gender::Male,
            item: Item::StandingLongJump,
            excellent: Some(250.0),
            good: Some(230.0),
            pass: Some(200.0),
            is_time_based: false,
            unit: "cm".into(),
            active: true,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn resolves_matching_rule() {
        let catalog = StandardCatalog::new(vec![rule(1, 7, 9, 10), rule(2, 10, 12, 10)]);
        let found = catalog
            .resolve(2024, 8, Gender::Male, Item::StandingLongJump)
            .unwrap();
        assert_eq!(found.id, 1);
        let found = catalog
            .resolve(2024, 12, Gender::Male, Item::StandingLongJump)
            .unwrap();
        assert_eq!(found.id, 2);
    }

    #[test]
    fn missing_rule_is_none_not_error() {
        let catalog = StandardCatalog::new(vec![rule(1, 7, 9, 0)]);
        assert!(catalog
            .resolve(2024, 8, Gender::Female, Item::StandingLongJump)
            .is_none());
        assert!(catalog.resolve(2023, 8, Gender::Male, Item::StandingLongJump).is_none());
        let err = catalog
            .resolve_or_err(2024, 3, Gender::Male, Item::StandingLongJump)
            .unwrap_err();
        assert!(err.is_item_level());
    }

    #[test]
    fn inactive_rules_are_ignored() {
        let mut inactive = rule(1, 7, 9, 0);
        inactive.active = false;
        let catalog = StandardCatalog::new(vec![inactive]);
        assert!(catalog.resolve(2024, 8, Gender::Male, Item::StandingLongJump).is_none());
    }

    #[test]
    fn most_recent_overlapping_rule_wins() {
        let catalog = StandardCatalog::new(vec![rule(1, 7, 9, 30), rule(2, 8, 8, 1), rule(3, 7, 9, 5)]);
        let found = catalog
            .resolve(2024, 8, Gender::Male, Item::StandingLongJump)
            .unwrap();
        assert_eq!(found.id, 2);
        let found = catalog
            .resolve(2024, 9, Gender::Male, Item::StandingLongJump)
            .unwrap();
        assert_eq!(found.id, 3);
    }

    #[test]
    fn overlaps_are_listed_and_rejected_in_strict_mode() {
        let rules = vec![rule(1, 7, 9, 30), rule(2, 9, 10, 1), rule(3, 11, 12, 1)];
        let catalog = StandardCatalog::new(rules.clone());
        assert_eq!(catalog.overlaps(), vec![(1, 2)]);
        assert!(matches!(
            StandardCatalog::strict(rules),
            Err(EngineError::OverlappingRules { first: 1, second: 2 })
        ));
    }

    #[test]
    fn validate_rejects_misordered_thresholds() {
        let mut r = rule(9, 7, 9, 0);
        r.good = Some(260.0);
        assert!(matches!(
            validate_rule(&r),
            Err(EngineError::InvalidRule { rule_id: 9, .. })
        ));
    }

    #[test]
    fn validate_time_based_direction() {
        let mut r = rule(4, 7, 9, 0);
        r.is_time_based = true;
        r.excellent = Some(8.0);
        r.good = Some(8.5);
        r.pass = Some(9.0);
        assert!(validate_rule(&r).is_ok());
        r.excellent = Some(9.5);
        assert!(validate_rule(&r).is_err());
    }

    #[test]
    fn validate_skips_missing_thresholds() {
        let mut r = rule(5, 7, 9, 0);
        r.good = None;
        assert!(validate_rule(&r).is_ok());
        r.excellent = Some(150.0);
        assert!(validate_rule(&r).is_err());
    }

    #[test]
    fn validate_rejects_inverted_grade_range() {
        let r = rule(6, 9, 7, 0);
        assert!(validate_rule(&r).is_err());
    }

    #[tokio::test]
    async fn load_catalog_filters_year_and_honours_strict_mode() {
        let mut other_year = rule(4, 7, 9, 0);
        other_year.year = 2023;
        let store = crate::testing::MemoryStore::default().with_rules(vec![
            rule(1, 7, 9, 3),
            rule(2, 8, 10, 1),
            other_year,
        ]);

        let catalog = load_catalog(&store, 2024, false).await.unwrap();
        assert_eq!(catalog.rules().len(), 2);
        assert_eq!(
            catalog
                .resolve(2024, 8, Gender::Male, Item::StandingLongJump)
                .map(|r| r.id),
            Some(2)
        );

        let err = load_catalog(&store, 2024, true).await.unwrap_err();
        assert!(matches!(err, EngineError::OverlappingRules { .. }));
        assert!(load_catalog(&store, 2023, true).await.is_ok());
    }

    #[tokio::test]
    async fn lenient_load_drops_broken_rules() {
        let mut misordered = rule(2, 7, 9, 0);
        misordered.good = Some(260.0);
        let mut inverted = rule(3, 12, 10, 0);
        inverted.item = Item::SitAndReach;
        let store = crate::testing::MemoryStore::default().with_rules(vec![
            rule(1, 7, 9, 5),
            misordered,
            inverted,
        ]);

        let catalog = load_catalog(&store, 2024, false).await.unwrap();
        assert_eq!(catalog.rules().len(), 1);
        assert_eq!(
            catalog
                .resolve(2024, 8, Gender::Male, Item::StandingLongJump)
                .map(|r| r.id),
            Some(1)
        );

        let err = load_catalog(&store, 2024, true).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRule { .. }));
    }
}
