//! Test fixtures: a minimal in-memory implementation of the store traits.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::model::{
    ClassId, Gender, GradeId, GradingRule, MeasurementRecord, Measurements, RecordId, Scope,
    StudentId,
};
use crate::traits::{MeasurementStore, RankUpdate, RosterStore, RuleFilter, RuleStore};

pub fn record(id: RecordId, class_id: ClassId, grade_id: GradeId, total: Option<f64>) -> MeasurementRecord {
    MeasurementRecord {
        id,
        student_id: id * 100,
        year: 2024,
        gender: Gender::Male,
        class_id,
        grade_id,
        measurements: Measurements::default(),
        composite_total: total,
        class_rank: None,
        grade_rank: None,
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<MeasurementRecord>>,
    rules: Vec<GradingRule>,
    classes: BTreeMap<ClassId, (GradeId, Vec<StudentId>)>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    /// Records plus rosters derived from them.
    pub fn with_records(records: Vec<MeasurementRecord>) -> Self {
        let mut classes: BTreeMap<ClassId, (GradeId, Vec<StudentId>)> = BTreeMap::new();
        for r in &records {
            let entry = classes.entry(r.class_id).or_insert((r.grade_id, Vec::new()));
            if !entry.1.contains(&r.student_id) {
                entry.1.push(r.student_id);
            }
        }
        Self {
            records: Mutex::new(records),
            classes,
            ..Default::default()
        }
    }

    pub fn with_rules(mut self, rules: Vec<GradingRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Add (or replace) a class roster.
    pub fn with_class(mut self, class_id: ClassId, grade_id: GradeId, students: Vec<StudentId>) -> Self {
        self.classes.insert(class_id, (grade_id, students));
        self
    }

    pub fn records(&self) -> Vec<MeasurementRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn fetch_grading_rules(&self, filter: &RuleFilter) -> anyhow::Result<Vec<GradingRule>> {
        Ok(self.rules.iter().filter(|r| filter.accepts(r)).cloned().collect())
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn fetch_measurements(&self, scope: Scope, year: i32) -> anyhow::Result<Vec<MeasurementRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.year == year && scope.contains(r))
            .cloned()
            .collect())
    }

    async fn save_ranks(&self, updates: &[RankUpdate]) -> anyhow::Result<()> {
        if self.fail_saves.load(Ordering::Relaxed) {
            anyhow::bail!("write rejected");
        }
        let mut records = self.records.lock().unwrap();
        for u in updates {
            if let Some(r) = records.iter_mut().find(|r| r.id == u.record_id) {
                r.class_rank = u.class_rank;
                r.grade_rank = u.grade_rank;
            }
        }
        Ok(())
    }

    async fn save_measurement(&self, record: &MeasurementRecord) -> anyhow::Result<()> {
        if self.fail_saves.load(Ordering::Relaxed) {
            anyhow::bail!("write rejected");
        }
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }
}

#[async_trait]
impl RosterStore for MemoryStore {
    async fn fetch_class_roster(&self, class_id: ClassId) -> anyhow::Result<Option<Vec<StudentId>>> {
        Ok(self.classes.get(&class_id).map(|(_, s)| s.clone()))
    }

    async fn fetch_grade_roster(&self, grade_id: GradeId) -> anyhow::Result<Option<Vec<StudentId>>> {
        let students: Vec<StudentId> = self
            .classes
            .values()
            .filter(|(g, _)| *g == grade_id)
            .flat_map(|(_, s)| s.iter().copied())
            .collect();
        let known = self.classes.values().any(|(g, _)| *g == grade_id);
        Ok(known.then_some(students))
    }

    async fn list_grades(&self) -> anyhow::Result<Vec<GradeId>> {
        let mut grades: Vec<GradeId> = self.classes.values().map(|(g, _)| *g).collect();
        grades.sort_unstable();
        grades.dedup();
        Ok(grades)
    }
}
