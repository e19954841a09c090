//! Class, grade and school statistics.
//!
//! Everything here is read-only. A [`StatSnapshot`] is recomputed from the
//! stores on every call and is safe to cache externally.

use std::collections::BTreeSet;

use anyhow::Context;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::catalog::{load_catalog, StandardCatalog};
use crate::error::EngineError;
use crate::evaluation::{check_value, round_to, EvaluationConfig, Evaluator};
use crate::model::{ClassId, GradeId, Item, MeasurementRecord, Scope, ScopeType, Tier};
use crate::traits::{MeasurementStore, RosterStore, RuleStore};

/// `num / den`, clamped to `[0, 1]`; a zero denominator yields `0`.
pub fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        (num as f64 / den as f64).min(1.0)
    }
}

/// Head counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub excellent: usize,
    pub good: usize,
    pub pass: usize,
    pub fail: usize,
}

impl TierCounts {
    pub fn add(&mut self, tier: Tier) {
        match tier {
            Tier::Excellent => self.excellent += 1,
            Tier::Good => self.good += 1,
            Tier::Pass => self.pass += 1,
            Tier::Fail => self.fail += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.excellent + self.good + self.pass + self.fail
    }

    /// Everyone at pass level or better.
    pub fn passed(&self) -> usize {
        self.excellent + self.good + self.pass
    }
}

/// Per-item raw value summary for grade and school scopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemBreakdown {
    pub item: Item,
    /// Records with a sane raw value for the item.
    pub measured: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    /// Tiers from each record's own rule for this item.
    pub tiers: TierCounts,
    /// Measured values with no applicable rule.
    pub ungraded: usize,
}

/// Aggregated figures for one scope and year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub scope: Scope,
    pub year: i32,
    pub total_students: usize,
    /// Records with a composite total.
    pub submitted_count: usize,
    pub submission_rate: f64,
    pub average_score: f64,
    /// Composite totals banded at 90/80/60.
    pub tiers: TierCounts,
    pub excellent_rate: f64,
    pub good_rate: f64,
    /// Share of submitted totals at 60 or above.
    pub pass_rate: f64,
    pub fail_rate: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemBreakdown>,
}

impl StatSnapshot {
    pub fn scope_type(&self) -> ScopeType {
        self.scope.scope_type()
    }
}

/// Build a snapshot from already-fetched records.
///
/// `records` may contain other scopes or years; only matching ones count.
/// The per-item breakdown is computed when `items` is given.
pub fn summarize(
    scope: Scope,
    year: i32,
    total_students: usize,
    records: &[MeasurementRecord],
    items: Option<(&StandardCatalog, &EvaluationConfig)>,
) -> StatSnapshot {
    let mut in_scope: Vec<&MeasurementRecord> = records
        .iter()
        .filter(|r| r.year == year && scope.contains(r))
        .collect();
    in_scope.sort_by_key(|r| r.id);

    let totals: Vec<f64> = in_scope.iter().filter_map(|r| r.composite_total).collect();
    let submitted = totals.len();
    let mut tiers = TierCounts::default();
    for &t in &totals {
        tiers.add(Tier::from_score(t));
    }
    let average_score = if submitted == 0 {
        0.0
    } else {
        round_to(totals.iter().sum::<f64>() / submitted as f64, 2)
    };

    let items = items
        .map(|(catalog, config)| item_breakdown(&in_scope, catalog, config))
        .unwrap_or_default();

    StatSnapshot {
        scope,
        year,
        total_students,
        submitted_count: submitted,
        submission_rate: ratio(submitted, total_students),
        average_score,
        tiers,
        excellent_rate: ratio(tiers.excellent, submitted),
        good_rate: ratio(tiers.good, submitted),
        pass_rate: ratio(tiers.passed(), submitted),
        fail_rate: ratio(tiers.fail, submitted),
        items,
    }
}

fn item_breakdown(
    records: &[&MeasurementRecord],
    catalog: &StandardCatalog,
    config: &EvaluationConfig,
) -> Vec<ItemBreakdown> {
    let evaluator = Evaluator::new(catalog, config);
    let mut breakdown = Vec::new();

    for item in Item::ALL {
        let mut values = Vec::new();
        let mut tiers = TierCounts::default();
        let mut ungraded = 0;

        for record in records {
            let Some(raw) = record.measurements.effective(item) else {
                continue;
            };
            if check_value(item, raw, config).is_err() {
                continue;
            }
            values.push(raw);
            match evaluator.item_tier(record, item, raw) {
                Some(tier) => tiers.add(tier),
                None => ungraded += 1,
            }
        }

        if values.is_empty() {
            continue;
        }
        let sum: f64 = values.iter().sum();
        breakdown.push(ItemBreakdown {
            item,
            measured: values.len(),
            average: round_to(sum / values.len() as f64, 2),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            tiers,
            ungraded,
        });
    }
    breakdown
}

/// Sort snapshots by average score descending, scope id ascending on ties.
pub fn sort_by_average(snapshots: &mut [StatSnapshot]) {
    snapshots.sort_by(|a, b| {
        b.average_score
            .total_cmp(&a.average_score)
            .then(a.scope.cmp(&b.scope))
    });
}

/// Computes snapshots by reading from the stores.
pub struct StatisticsAggregator<'a> {
    measurements: &'a dyn MeasurementStore,
    rosters: &'a dyn RosterStore,
    rules: &'a dyn RuleStore,
    config: &'a EvaluationConfig,
    strict_rules: bool,
}

impl<'a> StatisticsAggregator<'a> {
    pub fn new(
        measurements: &'a dyn MeasurementStore,
        rosters: &'a dyn RosterStore,
        rules: &'a dyn RuleStore,
        config: &'a EvaluationConfig,
    ) -> Self {
        Self {
            measurements,
            rosters,
            rules,
            config,
            strict_rules: false,
        }
    }

    /// Fail item breakdowns on overlapping rules instead of picking the newest.
    pub fn with_strict_rules(mut self, strict: bool) -> Self {
        self.strict_rules = strict;
        self
    }

    /// Snapshot for any scope.
    pub async fn snapshot(&self, scope: Scope, year: i32) -> Result<StatSnapshot, EngineError> {
        match scope {
            Scope::Class(id) => self.class_statistics(id, year).await,
            Scope::Grade(id) => self.grade_statistics(id, year).await,
            Scope::School => self.school_statistics(year).await,
        }
    }

    /// Class snapshot, without item breakdown.
    pub async fn class_statistics(
        &self,
        class_id: ClassId,
        year: i32,
    ) -> Result<StatSnapshot, EngineError> {
        let roster = self
            .rosters
            .fetch_class_roster(class_id)
            .await
            .with_context(|| format!("fetching roster of class {class_id}"))?
            .ok_or_else(|| EngineError::unknown(ScopeType::Class, class_id))?;
        let scope = Scope::Class(class_id);
        let records = self.fetch(scope, year).await?;
        Ok(summarize(scope, year, roster.len(), &records, None))
    }

    /// Grade snapshot with item breakdown.
    pub async fn grade_statistics(
        &self,
        grade_id: GradeId,
        year: i32,
    ) -> Result<StatSnapshot, EngineError> {
        let roster = self
            .rosters
            .fetch_grade_roster(grade_id)
            .await
            .with_context(|| format!("fetching roster of grade {grade_id}"))?
            .ok_or_else(|| EngineError::unknown(ScopeType::Grade, grade_id))?;
        let scope = Scope::Grade(grade_id);
        let records = self.fetch(scope, year).await?;
        let catalog = load_catalog(self.rules, year, self.strict_rules).await?;
        Ok(summarize(
            scope,
            year,
            roster.len(),
            &records,
            Some((&catalog, self.config)),
        ))
    }

    /// Whole-school snapshot with item breakdown. Population is the sum of all grade rosters.
    pub async fn school_statistics(&self, year: i32) -> Result<StatSnapshot, EngineError> {
        let grades = self
            .rosters
            .list_grades()
            .await
            .context("listing grades")?;
        let mut total_students = 0;
        for grade_id in grades {
            let roster = self
                .rosters
                .fetch_grade_roster(grade_id)
                .await
                .with_context(|| format!("fetching roster of grade {grade_id}"))?;
            total_students += roster.map_or(0, |r| r.len());
        }
        let records = self.fetch(Scope::School, year).await?;
        let catalog = load_catalog(self.rules, year, self.strict_rules).await?;
        Ok(summarize(
            Scope::School,
            year,
            total_students,
            &records,
            Some((&catalog, self.config)),
        ))
    }

    /// Class snapshots sorted by average score. Any unknown class fails the whole call.
    pub async fn compare_classes(
        &self,
        class_ids: &[ClassId],
        year: i32,
    ) -> Result<Vec<StatSnapshot>, EngineError> {
        let unique: BTreeSet<ClassId> = class_ids.iter().copied().collect();
        let mut snapshots =
            try_join_all(unique.into_iter().map(|id| self.class_statistics(id, year))).await?;
        sort_by_average(&mut snapshots);
        Ok(snapshots)
    }

    /// Snapshot of every grade in the school, sorted by average score.
    ///
    /// Grades come from the class rosters. A grade that only appears in a
    /// rule's grade range has no students and is not listed.
    pub async fn grade_ranking(&self, year: i32) -> Result<Vec<StatSnapshot>, EngineError> {
        let grades: BTreeSet<GradeId> = self
            .rosters
            .list_grades()
            .await
            .context("listing grades")?
            .into_iter()
            .collect();
        let mut snapshots =
            try_join_all(grades.into_iter().map(|id| self.grade_statistics(id, year))).await?;
        sort_by_average(&mut snapshots);
        Ok(snapshots)
    }

    async fn fetch(&self, scope: Scope, year: i32) -> Result<Vec<MeasurementRecord>, EngineError> {
        let records = self
            .measurements
            .fetch_measurements(scope, year)
            .await
            .with_context(|| format!("fetching measurements of {scope} for {year}"))?;
        tracing::debug!(%scope, year, records = records.len(), "measurements fetched");
        Ok(records)
    }
}
