//! The engine facade.
//!
//! [`FitnessEngine`] wires the collaborator stores to the catalog, evaluator,
//! ranking engine, statistics aggregator and trend analyzer, and exposes the
//! operations callers use.

use std::sync::Arc;

use anyhow::{bail, Context};

use crate::catalog::{load_catalog, StandardCatalog};
use crate::error::EngineError;
use crate::evaluation::{EvaluationConfig, Evaluator, ScoredRecord};
use crate::model::{ClassId, GradeId, MeasurementRecord, Scope};
use crate::ranking::{RankingEngine, RecomputeReport};
use crate::statistics::{StatSnapshot, StatisticsAggregator};
use crate::traits::{MeasurementStore, RosterStore, RuleStore};
use crate::trend::{CancelFlag, TrendAnalyzer, TrendScope, TrendSeries};

/// Configuration for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum concurrent class partitions written during a recompute.
    pub parallelism: usize,
    /// Weights and sanity bounds used when scoring.
    pub evaluation: EvaluationConfig,
    /// Refuse to build a catalog with overlapping active rules.
    pub strict_rules: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            evaluation: EvaluationConfig::default(),
            strict_rules: false,
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.parallelism == 0 {
            bail!("parallelism must be at least 1");
        }
        if let Some(weights) = &self.evaluation.weights {
            for (item, w) in &weights.0 {
                if !w.is_finite() || *w < 0.0 {
                    bail!("weight for {item} must be a non-negative number, got {w}");
                }
            }
        }
        for (item, (min, max)) in &self.evaluation.sanity {
            if !(min.is_finite() && max.is_finite()) || min > max {
                bail!("sanity range for {item} is invalid: [{min}, {max}]");
            }
        }
        Ok(())
    }
}

/// Grading, ranking and statistics over a set of collaborator stores.
pub struct FitnessEngine {
    rules: Arc<dyn RuleStore>,
    measurements: Arc<dyn MeasurementStore>,
    rosters: Arc<dyn RosterStore>,
    config: EngineConfig,
    ranking: RankingEngine,
}

impl FitnessEngine {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        measurements: Arc<dyn MeasurementStore>,
        rosters: Arc<dyn RosterStore>,
        config: EngineConfig,
    ) -> Self {
        let ranking = RankingEngine::new(config.parallelism);
        Self {
            rules,
            measurements,
            rosters,
            config,
            ranking,
        }
    }

    /// Build an engine over one store that serves all three collaborator roles.
    pub fn from_store<S>(store: Arc<S>, config: EngineConfig) -> Self
    where
        S: RuleStore + MeasurementStore + RosterStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Active rules of `year`, checked for overlaps when strict.
    pub async fn catalog(&self, year: i32) -> Result<StandardCatalog, EngineError> {
        load_catalog(self.rules.as_ref(), year, self.config.strict_rules).await
    }

    /// Grade one record against its year's catalog. Nothing is written.
    pub async fn evaluate(&self, record: &MeasurementRecord) -> Result<ScoredRecord, EngineError> {
        let catalog = self.catalog(record.year).await?;
        Ok(self.evaluate_with(&catalog, record))
    }

    /// Grade one record against an already loaded catalog.
    pub fn evaluate_with(&self, catalog: &StandardCatalog, record: &MeasurementRecord) -> ScoredRecord {
        Evaluator::new(catalog, &self.config.evaluation).evaluate(record)
    }

    /// Grade every stored record of `year` with a single catalog load.
    pub async fn evaluate_year(&self, year: i32) -> Result<Vec<ScoredRecord>, EngineError> {
        let catalog = self.catalog(year).await?;
        let mut records = self
            .measurements
            .fetch_measurements(Scope::School, year)
            .await
            .with_context(|| format!("fetching measurements for {year}"))?;
        records.sort_by_key(|r| r.id);
        tracing::debug!(year, records = records.len(), "evaluating year");
        Ok(records
            .iter()
            .map(|r| self.evaluate_with(&catalog, r))
            .collect())
    }

    /// Evaluate `record` and persist it with its new composite total.
    ///
    /// Ranks are left as they are until the next [`recompute_rankings`](Self::recompute_rankings).
    pub async fn submit(
        &self,
        record: &MeasurementRecord,
    ) -> Result<(MeasurementRecord, ScoredRecord), EngineError> {
        let scored = self.evaluate(record).await?;
        let updated = scored.apply_to(record);
        self.measurements
            .save_measurement(&updated)
            .await
            .with_context(|| format!("saving record {}", record.id))?;
        tracing::debug!(
            record = record.id,
            total = ?updated.composite_total,
            "measurement submitted"
        );
        Ok((updated, scored))
    }

    /// Full class and grade rank recompute for `year`.
    pub async fn recompute_rankings(&self, year: i32) -> Result<RecomputeReport, EngineError> {
        self.ranking.recompute(self.measurements.as_ref(), year).await
    }

    pub fn is_recomputing(&self, year: i32) -> bool {
        self.ranking.is_running(year)
    }

    pub async fn class_statistics(
        &self,
        class_id: ClassId,
        year: i32,
    ) -> Result<StatSnapshot, EngineError> {
        self.aggregator().class_statistics(class_id, year).await
    }

    pub async fn grade_statistics(
        &self,
        grade_id: GradeId,
        year: i32,
    ) -> Result<StatSnapshot, EngineError> {
        self.aggregator().grade_statistics(grade_id, year).await
    }

    pub async fn school_statistics(&self, year: i32) -> Result<StatSnapshot, EngineError> {
        self.aggregator().school_statistics(year).await
    }

    pub async fn compare_classes(
        &self,
        class_ids: &[ClassId],
        year: i32,
    ) -> Result<Vec<StatSnapshot>, EngineError> {
        self.aggregator().compare_classes(class_ids, year).await
    }

    pub async fn grade_ranking(&self, year: i32) -> Result<Vec<StatSnapshot>, EngineError> {
        self.aggregator().grade_ranking(year).await
    }

    /// Per-year rollup over `start..=end`, stoppable between years via `cancel`.
    pub async fn trend(
        &self,
        scope: TrendScope,
        start: i32,
        end: i32,
        cancel: Option<&CancelFlag>,
    ) -> Result<TrendSeries, EngineError> {
        let aggregator = self.aggregator();
        TrendAnalyzer::new(&aggregator)
            .trend(scope, start, end, cancel)
            .await
    }

    fn aggregator(&self) -> StatisticsAggregator<'_> {
        StatisticsAggregator::new(
            self.measurements.as_ref(),
            self.rosters.as_ref(),
            self.rules.as_ref(),
            &self.config.evaluation,
        )
        .with_strict_rules(self.config.strict_rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{ItemOutcome, ItemWeights};
    use crate::model::{Gender, GradingRule, Item, Measurements, Tier};
    use crate::testing::{record, MemoryStore};
    use chrono::{Duration, Utc};

    fn rule(id: u64, item: Item, thresholds: [f64; 3], is_time_based: bool) -> GradingRule {
        GradingRule {
            id,
            year: 2024,
            grade_min: 7,
            grade_max: 9,
            gender: Gender::Male,
            item,
            excellent: Some(thresholds[0]),
            good: Some(thresholds[1]),
            pass: Some(thresholds[2]),
            is_time_based,
            unit: item.default_unit().into(),
            active: true,
            created_at: Utc::now(),
        }
    }

    fn rules() -> Vec<GradingRule> {
        vec![
            rule(1, Item::SitUps, [50.0, 40.0, 30.0], false),
            rule(2, Item::Sprint50m, [7.0, 7.5, 8.5], true),
        ]
    }

    fn measured(id: u64, class_id: u32, sit_ups: f64, sprint: f64) -> MeasurementRecord {
        let mut r = record(id, class_id, 7, None);
        r.measurements = Measurements {
            sit_ups: Some(sit_ups),
            sprint_50m: Some(sprint),
            ..Default::default()
        };
        r
    }

    fn engine(store: Arc<MemoryStore>) -> FitnessEngine {
        FitnessEngine::from_store(store, EngineConfig::default())
    }

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.evaluation.weights, Some(ItemWeights::national_standard()));
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let config = EngineConfig {
            parallelism: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_sanity_range_is_rejected() {
        let mut config = EngineConfig::default();
        config.evaluation.sanity.insert(Item::Height, (250.0, 50.0));
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("height"), "got {err}");
    }

    #[tokio::test]
    async fn evaluate_keeps_partial_results() {
        let store = Arc::new(MemoryStore::default().with_rules(rules()));
        let engine = engine(store);
        let mut r = measured(1, 1, 45.0, 7.2);
        r.measurements.pull_ups = Some(5.0);
        r.measurements.sit_and_reach = Some(400.0);

        let scored = engine.evaluate(&r).await.unwrap();
        let composite = scored.composite.unwrap();
        assert_eq!(composite.scored_items, 2);

        let issues = scored.issues(&r);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(EngineError::is_item_level));
        let pull_ups = scored.items.iter().find(|e| e.item == Item::PullUps).unwrap();
        assert_eq!(pull_ups.outcome, ItemOutcome::NotApplicable);
    }

    #[tokio::test]
    async fn newest_rule_wins_unless_strict() {
        let mut older = rule(1, Item::SitUps, [50.0, 40.0, 30.0], false);
        older.created_at = Utc::now() - Duration::days(30);
        let newer = rule(9, Item::SitUps, [60.0, 55.0, 45.0], false);
        let store = Arc::new(MemoryStore::default().with_rules(vec![older, newer]));

        let lenient = engine(store.clone());
        let scored = lenient.evaluate(&measured(1, 1, 50.0, 7.2)).await.unwrap();
        let sit_ups = scored.items.iter().find(|e| e.item == Item::SitUps).unwrap();
        assert!(matches!(
            sit_ups.outcome,
            ItemOutcome::Scored {
                rule_id: 9,
                tier: Tier::Pass,
                ..
            }
        ));

        let strict = FitnessEngine::from_store(
            store,
            EngineConfig {
                strict_rules: true,
                ..Default::default()
            },
        );
        let err = strict.evaluate(&measured(1, 1, 50.0, 7.2)).await.unwrap_err();
        assert!(matches!(err, EngineError::OverlappingRules { .. }));
    }

    #[tokio::test]
    async fn submit_persists_total_without_touching_ranks() {
        let mut existing = measured(1, 1, 45.0, 7.2);
        existing.class_rank = Some(2);
        let store = Arc::new(MemoryStore::with_records(vec![existing.clone()]).with_rules(rules()));
        let engine = engine(store.clone());

        let (updated, scored) = engine.submit(&existing).await.unwrap();
        assert_eq!(updated.composite_total, scored.composite.and_then(|c| c.score()));
        assert!(updated.composite_total.is_some());

        let stored = &store.records()[0];
        assert_eq!(stored.composite_total, updated.composite_total);
        assert_eq!(stored.class_rank, Some(2));
    }

    #[tokio::test]
    async fn submit_surfaces_store_failures() {
        let store = Arc::new(MemoryStore::default().with_rules(rules()));
        store.fail_saves(true);
        let err = engine(store).submit(&measured(1, 1, 45.0, 7.2)).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
    }

    #[tokio::test]
    async fn weighted_composites_flow_into_rankings() {
        let records = vec![
            measured(1, 1, 52.0, 7.2),
            measured(2, 1, 35.0, 8.0),
            measured(3, 2, 52.0, 7.2),
        ];
        let store = Arc::new(MemoryStore::with_records(records.clone()).with_rules(rules()));
        let engine = engine(store.clone());

        for r in &records {
            engine.submit(r).await.unwrap();
        }
        let report = engine.recompute_rankings(2024).await.unwrap();
        assert_eq!(report.classes_updated, 2);
        assert_eq!(report.grades_updated, 1);
        assert_eq!(report.records_updated, 3);

        let stored = store.records();
        assert_eq!(stored[0].class_rank, Some(1));
        assert_eq!(stored[1].class_rank, Some(2));
        assert_eq!(stored[2].class_rank, Some(1));
        assert_eq!(stored[0].grade_rank, Some(1));
        assert_eq!(stored[2].grade_rank, Some(1));
        assert_eq!(stored[1].grade_rank, Some(3));
    }

    #[tokio::test]
    async fn default_config_statistics_stay_on_hundred_scale() {
        // Both items pass; the record must band as pass, not excellent.
        let r = measured(1, 1, 32.0, 8.4);
        let store = Arc::new(MemoryStore::with_records(vec![r.clone()]).with_rules(rules()));
        let engine = engine(store);

        let (updated, scored) = engine.submit(&r).await.unwrap();
        let composite = scored.composite.unwrap();
        assert_eq!(composite.scored_items, 2);
        let total = updated.composite_total.unwrap();
        assert!((60.0..80.0).contains(&total), "got {total}");

        let class = engine.class_statistics(1, 2024).await.unwrap();
        assert_eq!(class.tiers.pass, 1);
        assert_eq!(class.excellent_rate, 0.0);
        assert_eq!(class.pass_rate, 1.0);
        assert_eq!(class.average_score, total);

        let plain = FitnessEngine::from_store(
            Arc::new(MemoryStore::with_records(vec![r.clone()]).with_rules(rules())),
            EngineConfig {
                evaluation: EvaluationConfig::plain_sum(),
                ..Default::default()
            },
        );
        let (updated, _) = plain.submit(&r).await.unwrap();
        assert!(updated.composite_total.unwrap() <= 100.0);
    }

    #[tokio::test]
    async fn evaluate_year_is_ordered_by_record() {
        let store = Arc::new(
            MemoryStore::with_records(vec![measured(5, 1, 45.0, 7.2), measured(2, 1, 30.0, 9.0)])
                .with_rules(rules()),
        );
        let scored = engine(store).evaluate_year(2024).await.unwrap();
        let ids: Vec<u64> = scored.iter().map(|s| s.record_id).collect();
        assert_eq!(ids, vec![2, 5]);
    }

    #[tokio::test]
    async fn statistics_and_trend_through_the_facade() {
        let store = Arc::new(MemoryStore::with_records(vec![
            record(1, 1, 7, Some(92.0)),
            record(2, 2, 7, Some(61.0)),
        ]));
        let engine = engine(store);

        let class = engine.class_statistics(1, 2024).await.unwrap();
        assert_eq!(class.excellent_rate, 1.0);

        let compared = engine.compare_classes(&[2, 1], 2024).await.unwrap();
        assert_eq!(compared[0].scope, Scope::Class(1));

        let grade = engine.grade_statistics(7, 2024).await.unwrap();
        assert_eq!(grade.average_score, 76.5);

        let school = engine.school_statistics(2024).await.unwrap();
        assert_eq!(school.submitted_count, 2);

        let trend = engine
            .trend(TrendScope::School, 2023, 2024, None)
            .await
            .unwrap();
        assert_eq!(trend.points.len(), 2);
        assert_eq!(trend.points[1].pass_rate, 1.0);

        assert_eq!(engine.grade_ranking(2024).await.unwrap().len(), 1);
    }
}
