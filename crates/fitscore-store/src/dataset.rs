//! JSON dataset files: class rosters plus measurement records.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use fitscore_core::model::{ClassId, GradeId, MeasurementRecord, StudentId};

use crate::error::StoreError;

/// Current membership of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRoster {
    pub id: ClassId,
    pub grade_id: GradeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub students: Vec<StudentId>,
}

/// Everything the in-memory store persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub classes: Vec<ClassRoster>,
    #[serde(default)]
    pub records: Vec<MeasurementRecord>,
}

impl Dataset {
    /// Save the dataset as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize dataset")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write dataset to {}", path.display()))?;
        Ok(())
    }

    /// Load a dataset from a JSON file and check it for consistency.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset from {}", path.display()))?;
        let dataset: Dataset = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse dataset JSON: {}", path.display()))?;
        dataset
            .check()
            .with_context(|| format!("inconsistent dataset: {}", path.display()))?;
        Ok(dataset)
    }

    /// Reject duplicate ids and a second record for the same student-year.
    ///
    /// Records pointing at classes that are not in the roster list are
    /// allowed (students move on); they are only logged.
    pub fn check(&self) -> Result<(), StoreError> {
        let mut class_ids = HashSet::new();
        for class in &self.classes {
            if !class_ids.insert(class.id) {
                return Err(StoreError::DuplicateClass(class.id));
            }
        }

        let mut record_ids = HashSet::new();
        let mut student_years: HashMap<(StudentId, i32), u64> = HashMap::new();
        for r in &self.records {
            if !record_ids.insert(r.id) {
                return Err(StoreError::DuplicateRecord(r.id));
            }
            if let Some(&existing) = student_years.get(&(r.student_id, r.year)) {
                return Err(StoreError::DuplicateStudentYear {
                    student_id: r.student_id,
                    year: r.year,
                    existing,
                });
            }
            student_years.insert((r.student_id, r.year), r.id);
            if !class_ids.contains(&r.class_id) {
                tracing::debug!(record = r.id, class_id = r.class_id, "record of a class without roster");
            }
        }
        Ok(())
    }

    /// Distinct years with at least one record, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|r| r.year).collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}
