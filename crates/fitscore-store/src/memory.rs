//! In-memory store backing the CLI and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use fitscore_core::model::{
    ClassId, GradeId, GradingRule, MeasurementRecord, RecordId, Scope, StudentId,
};
use fitscore_core::traits::{
    MeasurementStore, RankUpdate, RosterStore, RuleFilter, RuleStore,
};

use crate::dataset::{ClassRoster, Dataset};
use crate::error::StoreError;

/// Implements every collaborator trait over plain collections.
///
/// Records are keyed by id, so fetches come back in id order.
#[derive(Default)]
pub struct InMemoryStore {
    rules: RwLock<Vec<GradingRule>>,
    classes: RwLock<BTreeMap<ClassId, ClassRoster>>,
    records: RwLock<BTreeMap<RecordId, MeasurementRecord>>,
    rank_writes: AtomicU32,
    measurement_writes: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a checked dataset and a rule list.
    pub fn from_dataset(dataset: Dataset, rules: Vec<GradingRule>) -> Result<Self, StoreError> {
        dataset.check()?;
        let classes = dataset.classes.into_iter().map(|c| (c.id, c)).collect();
        let records = dataset.records.into_iter().map(|r| (r.id, r)).collect();
        Ok(Self {
            rules: RwLock::new(rules),
            classes: RwLock::new(classes),
            records: RwLock::new(records),
            ..Default::default()
        })
    }

    /// Current contents as a dataset, for persisting.
    pub async fn to_dataset(&self) -> Dataset {
        Dataset {
            classes: self.classes.read().await.values().cloned().collect(),
            records: self.records.read().await.values().cloned().collect(),
        }
    }

    pub async fn set_rules(&self, rules: Vec<GradingRule>) {
        *self.rules.write().await = rules;
    }

    /// Add or replace a class roster.
    pub async fn upsert_class(&self, class: ClassRoster) {
        self.classes.write().await.insert(class.id, class);
    }

    pub async fn record(&self, id: RecordId) -> Option<MeasurementRecord> {
        self.records.read().await.get(&id).cloned()
    }

    pub async fn records(&self) -> Vec<MeasurementRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Number of `save_ranks` batches written.
    pub fn rank_writes(&self) -> u32 {
        self.rank_writes.load(Ordering::Relaxed)
    }

    /// Number of `save_measurement` calls that succeeded.
    pub fn measurement_writes(&self) -> u32 {
        self.measurement_writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RuleStore for InMemoryStore {
    async fn fetch_grading_rules(&self, filter: &RuleFilter) -> anyhow::Result<Vec<GradingRule>> {
        Ok(self
            .rules
            .read()
            .await
            .iter()
            .filter(|r| filter.accepts(r))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MeasurementStore for InMemoryStore {
    async fn fetch_measurements(
        &self,
        scope: Scope,
        year: i32,
    ) -> anyhow::Result<Vec<MeasurementRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.year == year && scope.contains(r))
            .cloned()
            .collect())
    }

    async fn save_ranks(&self, updates: &[RankUpdate]) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        if let Some(missing) = updates.iter().find(|u| !records.contains_key(&u.record_id)) {
            return Err(StoreError::UnknownRecord(missing.record_id).into());
        }
        for u in updates {
            if let Some(r) = records.get_mut(&u.record_id) {
                r.class_rank = u.class_rank;
                r.grade_rank = u.grade_rank;
            }
        }
        self.rank_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn save_measurement(&self, record: &MeasurementRecord) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        if let Some(other) = records
            .values()
            .find(|r| r.student_id == record.student_id && r.year == record.year && r.id != record.id)
        {
            return Err(StoreError::DuplicateStudentYear {
                student_id: record.student_id,
                year: record.year,
                existing: other.id,
            }
            .into());
        }
        records.insert(record.id, record.clone());
        self.measurement_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl RosterStore for InMemoryStore {
    async fn fetch_class_roster(&self, class_id: ClassId) -> anyhow::Result<Option<Vec<StudentId>>> {
        Ok(self
            .classes
            .read()
            .await
            .get(&class_id)
            .map(|c| c.students.clone()))
    }

    async fn fetch_grade_roster(&self, grade_id: GradeId) -> anyhow::Result<Option<Vec<StudentId>>> {
        let classes = self.classes.read().await;
        let mut in_grade = classes.values().filter(|c| c.grade_id == grade_id).peekable();
        if in_grade.peek().is_none() {
            return Ok(None);
        }
        let mut students: Vec<StudentId> = in_grade.flat_map(|c| c.students.iter().copied()).collect();
        students.sort_unstable();
        students.dedup();
        Ok(Some(students))
    }

    async fn list_grades(&self) -> anyhow::Result<Vec<GradeId>> {
        let mut grades: Vec<GradeId> = self.classes.read().await.values().map(|c| c.grade_id).collect();
        grades.sort_unstable();
        grades.dedup();
        Ok(grades)
    }
}
