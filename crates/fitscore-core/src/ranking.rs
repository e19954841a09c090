//! Class and grade ranking.
//!
//! Ranks are a pure function of the composite totals in a partition and are
//! recomputed in full on every run; nothing incremental is kept.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Context;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{ClassId, MeasurementRecord, RankAssignment, RecordId, Scope, ScopeType};
use crate::traits::{MeasurementStore, RankUpdate};

/// Standard competition ranking ("1224") of `(record, total)` pairs.
///
/// Output is ordered by total descending, then record id ascending. Equal
/// totals share a rank and the next distinct total takes its 1-based position.
pub fn competition_ranks(entries: &[(RecordId, f64)]) -> Vec<(RecordId, u32)> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut ranks = Vec::with_capacity(sorted.len());
    let mut previous: Option<f64> = None;
    let mut rank = 0u32;
    for (pos, (id, total)) in sorted.into_iter().enumerate() {
        if previous != Some(total) {
            rank = pos as u32 + 1;
            previous = Some(total);
        }
        ranks.push((id, rank));
    }
    ranks
}

/// Rank every record with a composite total inside its partition.
pub fn rank_partitions(
    records: &[MeasurementRecord],
    scope_type: ScopeType,
) -> BTreeMap<u32, Vec<RankAssignment>> {
    let mut partitions: BTreeMap<u32, Vec<(RecordId, f64)>> = BTreeMap::new();
    for r in records {
        let Some(total) = r.composite_total else {
            continue;
        };
        let key = match scope_type {
            ScopeType::Class => r.class_id,
            ScopeType::Grade => r.grade_id,
            ScopeType::School => 0,
        };
        partitions.entry(key).or_default().push((r.id, total));
    }

    partitions
        .into_iter()
        .map(|(scope_id, entries)| {
            let assignments = competition_ranks(&entries)
                .into_iter()
                .map(|(record_id, rank)| RankAssignment {
                    record_id,
                    scope_id,
                    scope_type,
                    rank,
                })
                .collect();
            (scope_id, assignments)
        })
        .collect()
}

/// Per-record rank updates for one year, grouped by class for write-back.
#[derive(Debug, Clone, Default)]
pub struct RankPlan {
    pub updates_by_class: BTreeMap<ClassId, Vec<RankUpdate>>,
    pub classes_ranked: usize,
    pub grades_ranked: usize,
    pub records_ranked: usize,
    pub records_cleared: usize,
}

impl RankPlan {
    /// Merge class and grade assignments. Records without a total get `None` ranks.
    pub fn build(records: &[MeasurementRecord]) -> Self {
        let by_class = rank_partitions(records, ScopeType::Class);
        let by_grade = rank_partitions(records, ScopeType::Grade);

        let lookup = |partitions: &BTreeMap<u32, Vec<RankAssignment>>| -> BTreeMap<RecordId, u32> {
            partitions
                .values()
                .flatten()
                .map(|a| (a.record_id, a.rank))
                .collect()
        };
        let class_ranks = lookup(&by_class);
        let grade_ranks = lookup(&by_grade);

        let mut plan = RankPlan {
            classes_ranked: by_class.len(),
            grades_ranked: by_grade.len(),
            ..Default::default()
        };

        for r in records {
            let update = RankUpdate {
                record_id: r.id,
                class_rank: class_ranks.get(&r.id).copied(),
                grade_rank: grade_ranks.get(&r.id).copied(),
            };
            if update.class_rank.is_some() {
                plan.records_ranked += 1;
            } else {
                plan.records_cleared += 1;
            }
            plan.updates_by_class.entry(r.class_id).or_default().push(update);
        }

        for updates in plan.updates_by_class.values_mut() {
            updates.sort_by_key(|u| u.record_id);
        }
        plan
    }
}

/// Summary of one full recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecomputeReport {
    pub run_id: Uuid,
    pub year: i32,
    pub classes_updated: usize,
    pub grades_updated: usize,
    pub records_updated: usize,
    /// Records without a composite total whose ranks were reset.
    pub records_cleared: usize,
    pub duration_ms: u64,
}

/// Runs full per-year rank recomputes, one at a time per year.
pub struct RankingEngine {
    parallelism: usize,
    running: Mutex<HashSet<i32>>,
}

/// Holds the per-year lock until dropped.
struct YearGuard<'a> {
    running: &'a Mutex<HashSet<i32>>,
    year: i32,
}

impl Drop for YearGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut years) = self.running.lock() {
            years.remove(&self.year);
        }
    }
}

impl RankingEngine {
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a recompute for `year` is currently running.
    pub fn is_running(&self, year: i32) -> bool {
        self.running
            .lock()
            .map(|years| years.contains(&year))
            .unwrap_or(false)
    }

    fn lock_year(&self, year: i32) -> Result<YearGuard<'_>, EngineError> {
        let mut years = self
            .running
            .lock()
            .map_err(|_| anyhow::anyhow!("ranking lock poisoned"))?;
        if !years.insert(year) {
            return Err(EngineError::ConcurrentRecompute { year });
        }
        Ok(YearGuard {
            running: &self.running,
            year,
        })
    }

    /// Recompute class and grade ranks for every record of `year`.
    ///
    /// A second call for the same year while one is running is rejected with
    /// [`EngineError::ConcurrentRecompute`]. Class partitions are written back
    /// concurrently, bounded by the configured parallelism.
    ///
    /// Writes are not atomic across classes. If one class fails to save, the
    /// error is returned but classes already written keep their new ranks.
    /// Running the recompute again restores consistent ranks for the year.
    pub async fn recompute(
        &self,
        store: &dyn MeasurementStore,
        year: i32,
    ) -> Result<RecomputeReport, EngineError> {
        let _guard = self.lock_year(year)?;
        let start = Instant::now();
        let run_id = Uuid::new_v4();

        let records = store
            .fetch_measurements(Scope::School, year)
            .await
            .with_context(|| format!("fetching measurements for {year}"))?;
        let plan = RankPlan::build(&records);
        tracing::debug!(
            year,
            records = records.len(),
            classes = plan.classes_ranked,
            grades = plan.grades_ranked,
            "rank plan built"
        );

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut writes = FuturesUnordered::new();
        for (class_id, updates) in &plan.updates_by_class {
            let semaphore = Arc::clone(&semaphore);
            writes.push(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                store
                    .save_ranks(updates)
                    .await
                    .with_context(|| format!("saving ranks for class {class_id}"))?;
                tracing::debug!(year, class_id, records = updates.len(), "class ranks saved");
                Ok::<_, anyhow::Error>(())
            });
        }
        while let Some(result) = writes.next().await {
            result?;
        }

        let report = RecomputeReport {
            run_id,
            year,
            classes_updated: plan.classes_ranked,
            grades_updated: plan.grades_ranked,
            records_updated: plan.records_ranked,
            records_cleared: plan.records_cleared,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            year,
            classes = report.classes_updated,
            grades = report.grades_updated,
            records = report.records_updated,
            "rankings recomputed"
        );
        Ok(report)
    }
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new(4)
    }
}
