//! Storage collaborator traits.
//!
//! The engine never owns persistence. Rule catalogs, measurement records and
//! rosters are reached through these async traits, implemented by
//! `fitscore-store` (or any database-backed service wrapping the engine).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{
    ClassId, Gender, GradeId, GradingRule, Item, MeasurementRecord, RecordId, Scope, StudentId,
};

// ---------------------------------------------------------------------------
// Grading rules
// ---------------------------------------------------------------------------

/// Source of grading standards.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Fetch every rule matching `filter`.
    async fn fetch_grading_rules(&self, filter: &RuleFilter) -> anyhow::Result<Vec<GradingRule>>;
}

/// Narrowing filter for rule fetches. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFilter {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub item: Option<Item>,
    /// Skip inactive rules.
    #[serde(default)]
    pub active_only: bool,
}

impl RuleFilter {
    /// Active rules for one year.
    pub fn for_year(year: i32) -> Self {
        Self {
            year: Some(year),
            active_only: true,
            ..Default::default()
        }
    }

    pub fn accepts(&self, rule: &GradingRule) -> bool {
        self.year.map_or(true, |y| rule.year == y)
            && self.gender.map_or(true, |g| rule.gender == g)
            && self.item.map_or(true, |i| rule.item == i)
            && (!self.active_only || rule.active)
    }
}

// ---------------------------------------------------------------------------
// Measurement records
// ---------------------------------------------------------------------------

/// Owner of per-student measurement records.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Fetch the records of `year` that belong to `scope`.
    async fn fetch_measurements(
        &self,
        scope: Scope,
        year: i32,
    ) -> anyhow::Result<Vec<MeasurementRecord>>;

    /// Batched write-back of class and grade ranks.
    async fn save_ranks(&self, updates: &[RankUpdate]) -> anyhow::Result<()>;

    /// Insert or replace one record (measurements and composite total).
    async fn save_measurement(&self, record: &MeasurementRecord) -> anyhow::Result<()>;
}

/// New rank values for one record. `None` clears a stale rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankUpdate {
    pub record_id: RecordId,
    pub class_rank: Option<u32>,
    pub grade_rank: Option<u32>,
}

// ---------------------------------------------------------------------------
// Rosters
// ---------------------------------------------------------------------------

/// Class and grade membership, independent of submission status.
#[async_trait]
pub trait RosterStore: Send + Sync {
    /// Students in a class, or `None` if the class does not exist.
    async fn fetch_class_roster(&self, class_id: ClassId) -> anyhow::Result<Option<Vec<StudentId>>>;

    /// Students in a grade, or `None` if the grade does not exist.
    async fn fetch_grade_roster(&self, grade_id: GradeId) -> anyhow::Result<Option<Vec<StudentId>>>;

    /// Every grade known to the school.
    async fn list_grades(&self) -> anyhow::Result<Vec<GradeId>>;
}
