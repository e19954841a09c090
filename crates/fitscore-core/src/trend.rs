//! Multi-year trend rollups.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::evaluation::round_to;
use crate::model::{GradeId, Scope};
use crate::statistics::{StatSnapshot, StatisticsAggregator};

/// Scopes a trend can be computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum TrendScope {
    Grade(GradeId),
    School,
}

impl From<TrendScope> for Scope {
    fn from(scope: TrendScope) -> Self {
        match scope {
            TrendScope::Grade(id) => Scope::Grade(id),
            TrendScope::School => Scope::School,
        }
    }
}

/// One point of a trend series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearPoint {
    pub year: i32,
    pub average_score: f64,
    pub excellent_rate: f64,
    pub pass_rate: f64,
    pub total_students: usize,
}

impl From<&StatSnapshot> for YearPoint {
    fn from(s: &StatSnapshot) -> Self {
        YearPoint {
            year: s.year,
            average_score: s.average_score,
            excellent_rate: s.excellent_rate,
            pass_rate: s.pass_rate,
            total_students: s.total_students,
        }
    }
}

/// Year-ordered points, possibly cut short by cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSeries {
    pub scope: TrendScope,
    pub start_year: i32,
    pub end_year: i32,
    pub points: Vec<YearPoint>,
    /// The run stopped before `end_year`; `points` holds the finished prefix.
    pub cancelled: bool,
}

impl TrendSeries {
    /// Change in average score from each year to the next.
    pub fn deltas(&self) -> Vec<(i32, f64)> {
        self.points
            .windows(2)
            .map(|w| (w[1].year, round_to(w[1].average_score - w[0].average_score, 2)))
            .collect()
    }
}

/// Shared flag to stop a trend run between years.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Longest accepted `start..=end` span, in years.
pub const MAX_TREND_YEARS: i64 = 1000;

/// Runs the statistics aggregator once per year.
pub struct TrendAnalyzer<'a> {
    aggregator: &'a StatisticsAggregator<'a>,
}

impl<'a> TrendAnalyzer<'a> {
    pub fn new(aggregator: &'a StatisticsAggregator<'a>) -> Self {
        Self { aggregator }
    }

    /// One point per year in `start..=end`, years without submissions included as zeros.
    ///
    /// Inverted ranges and ranges longer than [`MAX_TREND_YEARS`] are rejected.
    pub async fn trend(
        &self,
        scope: TrendScope,
        start: i32,
        end: i32,
        cancel: Option<&CancelFlag>,
    ) -> Result<TrendSeries, EngineError> {
        let span = i64::from(end) - i64::from(start) + 1;
        if !(1..=MAX_TREND_YEARS).contains(&span) {
            return Err(EngineError::InvalidYearRange { start, end });
        }

        let mut points = Vec::new();
        let mut cancelled = false;
        for year in start..=end {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                tracing::info!(?scope, year, "trend cancelled");
                cancelled = true;
                break;
            }
            let snapshot = self.aggregator.snapshot(scope.into(), year).await?;
            points.push(YearPoint::from(&snapshot));
        }

        Ok(TrendSeries {
            scope,
            start_year: start,
            end_year: end,
            points,
            cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::EvaluationConfig;
    use crate::testing::{record, MemoryStore};

    fn store() -> MemoryStore {
        let mut older = record(10, 1, 7, Some(60.0));
        older.year = 2022;
        let mut old = record(11, 1, 7, Some(70.0));
        old.year = 2022;
        MemoryStore::with_records(vec![
            older,
            old,
            record(1, 1, 7, Some(95.0)),
            record(2, 1, 7, Some(75.0)),
        ])
    }

    #[tokio::test]
    async fn one_point_per_year_with_zero_fill() {
        let store = store();
        let config = EvaluationConfig::default();
        let agg = StatisticsAggregator::new(&store, &store, &store, &config);
        let series = TrendAnalyzer::new(&agg)
            .trend(TrendScope::Grade(7), 2022, 2024, None)
            .await
            .unwrap();

        assert!(!series.cancelled);
        let years: Vec<i32> = series.points.iter().map(|p| p.year).collect();
        assert_eq!(years, vec![2022, 2023, 2024]);
        assert_eq!(series.points[0].average_score, 65.0);
        assert_eq!(series.points[1].average_score, 0.0);
        assert_eq!(series.points[1].pass_rate, 0.0);
        assert_eq!(series.points[2].average_score, 85.0);
        assert_eq!(series.points[2].excellent_rate, 0.5);
        assert_eq!(series.deltas(), vec![(2023, -65.0), (2024, 85.0)]);
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let store = store();
        let config = EvaluationConfig::default();
        let agg = StatisticsAggregator::new(&store, &store, &store, &config);
        let err = TrendAnalyzer::new(&agg)
            .trend(TrendScope::School, 2025, 2020, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidYearRange { .. }));
    }

    #[tokio::test]
    async fn extreme_ranges_are_rejected() {
        let store = store();
        let config = EvaluationConfig::default();
        let agg = StatisticsAggregator::new(&store, &store, &store, &config);
        let analyzer = TrendAnalyzer::new(&agg);
        let flag = CancelFlag::new();
        flag.cancel();

        for (start, end) in [(i32::MIN, i32::MAX), (0, 1000), (i32::MAX, i32::MIN)] {
            let err = analyzer
                .trend(TrendScope::School, start, end, Some(&flag))
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidYearRange { .. }), "{start}..={end}");
        }

        let widest = analyzer
            .trend(TrendScope::School, 1, 1000, Some(&flag))
            .await
            .unwrap();
        assert!(widest.cancelled);

        let single = analyzer
            .trend(TrendScope::School, i32::MAX, i32::MAX, None)
            .await
            .unwrap();
        assert_eq!(single.points.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_returns_empty_prefix() {
        let store = store();
        let config = EvaluationConfig::default();
        let agg = StatisticsAggregator::new(&store, &store, &store, &config);
        let flag = CancelFlag::new();
        flag.cancel();
        let series = TrendAnalyzer::new(&agg)
            .trend(TrendScope::School, 2022, 2024, Some(&flag))
            .await
            .unwrap();
        assert!(series.cancelled);
        assert!(series.points.is_empty());
    }

    #[tokio::test]
    async fn unknown_grade_aborts() {
        let store = store();
        let config = EvaluationConfig::default();
        let agg = StatisticsAggregator::new(&store, &store, &store, &config);
        let result = TrendAnalyzer::new(&agg)
            .trend(TrendScope::Grade(12), 2022, 2023, None)
            .await;
        assert!(matches!(result, Err(EngineError::UnknownScope { .. })));
    }
}
