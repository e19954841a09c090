//! Core data model types for fitscore.
//!
//! Grading rules, per-student measurement records, and the small identifier
//! and enum types shared by every engine component.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RecordId = u64;
pub type StudentId = u64;
pub type ClassId = u32;
/// Grade level (e.g. `7` for seventh grade); rules match it against `grade_min..=grade_max`.
pub type GradeId = u32;

/// Student gender as used by the grading standards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            other => Err(format!("unknown gender: {other}")),
        }
    }
}

/// A measured test item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Item {
    Height,
    Weight,
    Bmi,
    VitalCapacity,
    #[serde(rename = "sprint_50m")]
    Sprint50m,
    StandingLongJump,
    SitAndReach,
    EnduranceRun,
    SitUps,
    PullUps,
}

impl Item {
    pub const ALL: [Item; 10] = [
        Item::Height,
        Item::Weight,
        Item::Bmi,
        Item::VitalCapacity,
        Item::Sprint50m,
        Item::StandingLongJump,
        Item::SitAndReach,
        Item::EnduranceRun,
        Item::SitUps,
        Item::PullUps,
    ];

    /// Hard sanity range for raw values. Anything outside is a data-entry error.
    pub fn sanity_range(self) -> (f64, f64) {
        match self {
            Item::Height => (50.0, 250.0),
            Item::Weight => (10.0, 300.0),
            Item::Bmi => (5.0, 80.0),
            Item::VitalCapacity => (100.0, 10_000.0),
            Item::Sprint50m => (4.0, 30.0),
            Item::StandingLongJump => (30.0, 400.0),
            Item::SitAndReach => (-40.0, 60.0),
            Item::EnduranceRun => (100.0, 900.0),
            Item::SitUps => (0.0, 120.0),
            Item::PullUps => (0.0, 100.0),
        }
    }

    /// Timed runs, where a lower value is better.
    pub fn is_timed(self) -> bool {
        matches!(self, Item::Sprint50m | Item::EnduranceRun)
    }

    pub fn default_unit(self) -> &'static str {
        match self {
            Item::Height | Item::StandingLongJump | Item::SitAndReach => "cm",
            Item::Weight => "kg",
            Item::Bmi => "kg/m2",
            Item::VitalCapacity => "ml",
            Item::Sprint50m | Item::EnduranceRun => "s",
            Item::SitUps | Item::PullUps => "count",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Item::Height => "height",
            Item::Weight => "weight",
            Item::Bmi => "bmi",
            Item::VitalCapacity => "vital_capacity",
            Item::Sprint50m => "sprint_50m",
            Item::StandingLongJump => "standing_long_jump",
            Item::SitAndReach => "sit_and_reach",
            Item::EnduranceRun => "endurance_run",
            Item::SitUps => "sit_ups",
            Item::PullUps => "pull_ups",
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Item {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Item::ALL
            .iter()
            .copied()
            .find(|item| item.as_str() == normalized)
            .ok_or_else(|| format!("unknown item: {s}"))
    }
}

/// Qualitative grade band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Fail,
    Pass,
    Good,
    Excellent,
}

impl Tier {
    /// Numeric score band `[low, high]` for this tier.
    pub fn score_band(self) -> (f64, f64) {
        match self {
            Tier::Excellent => (90.0, 100.0),
            Tier::Good => (80.0, 89.0),
            Tier::Pass => (60.0, 79.0),
            Tier::Fail => (0.0, 59.0),
        }
    }

    /// Band a composite (or any 0–100) score with the 90/80/60 cut-offs.
    pub fn from_score(score: f64) -> Tier {
        match score {
            s if s >= 90.0 => Tier::Excellent,
            s if s >= 80.0 => Tier::Good,
            s if s >= 60.0 => Tier::Pass,
            _ => Tier::Fail,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Excellent => write!(f, "excellent"),
            Tier::Good => write!(f, "good"),
            Tier::Pass => write!(f, "pass"),
            Tier::Fail => write!(f, "fail"),
        }
    }
}

/// A grading standard for one `(year, grade range, gender, item)` scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingRule {
    pub id: u64,
    pub year: i32,
    pub grade_min: GradeId,
    pub grade_max: GradeId,
    pub gender: Gender,
    pub item: Item,
    /// Threshold for excellent. `None` means the tier is unattainable.
    #[serde(default)]
    pub excellent: Option<f64>,
    #[serde(default)]
    pub good: Option<f64>,
    #[serde(default)]
    pub pass: Option<f64>,
    /// Lower raw values are better (timed runs).
    #[serde(default)]
    pub is_time_based: bool,
    #[serde(default)]
    pub unit: String,
    #[serde(default = "default_true")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl GradingRule {
    /// Whether this rule is the applicable standard for the lookup key.
    pub fn matches(&self, year: i32, grade: GradeId, gender: Gender, item: Item) -> bool {
        self.active
            && self.year == year
            && self.grade_min <= grade
            && grade <= self.grade_max
            && self.gender == gender
            && self.item == item
    }

    /// Whether two rules compete for at least one lookup key.
    pub fn overlaps(&self, other: &GradingRule) -> bool {
        self.year == other.year
            && self.gender == other.gender
            && self.item == other.item
            && self.grade_min <= other.grade_max
            && other.grade_min <= self.grade_max
    }

    /// Present thresholds ordered from best to worst tier.
    pub fn thresholds(&self) -> [(Tier, Option<f64>); 3] {
        [
            (Tier::Excellent, self.excellent),
            (Tier::Good, self.good),
            (Tier::Pass, self.pass),
        ]
    }

    /// `true` when `value` is at least as good as `threshold` for this rule's direction.
    pub fn reaches(&self, value: f64, threshold: f64) -> bool {
        if self.is_time_based {
            value <= threshold
        } else {
            value >= threshold
        }
    }
}

/// Raw values for the ten measured items. Any may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vital_capacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_50m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standing_long_jump: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sit_and_reach: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endurance_run: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sit_ups: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_ups: Option<f64>,
}

impl Measurements {
    pub fn get(&self, item: Item) -> Option<f64> {
        match item {
            Item::Height => self.height,
            Item::Weight => self.weight,
            Item::Bmi => self.bmi,
            Item::VitalCapacity => self.vital_capacity,
            Item::Sprint50m => self.sprint_50m,
            Item::StandingLongJump => self.standing_long_jump,
            Item::SitAndReach => self.sit_and_reach,
            Item::EnduranceRun => self.endurance_run,
            Item::SitUps => self.sit_ups,
            Item::PullUps => self.pull_ups,
        }
    }

    pub fn set(&mut self, item: Item, value: Option<f64>) {
        let slot = match item {
            Item::Height => &mut self.height,
            Item::Weight => &mut self.weight,
            Item::Bmi => &mut self.bmi,
            Item::VitalCapacity => &mut self.vital_capacity,
            Item::Sprint50m => &mut self.sprint_50m,
            Item::StandingLongJump => &mut self.standing_long_jump,
            Item::SitAndReach => &mut self.sit_and_reach,
            Item::EnduranceRun => &mut self.endurance_run,
            Item::SitUps => &mut self.sit_ups,
            Item::PullUps => &mut self.pull_ups,
        };
        *slot = value;
    }

    /// Value for `item`, deriving BMI from height and weight when it was not submitted.
    pub fn effective(&self, item: Item) -> Option<f64> {
        match (item, self.get(item)) {
            (_, Some(v)) => Some(v),
            (Item::Bmi, None) => self.derived_bmi(),
            _ => None,
        }
    }

    fn derived_bmi(&self) -> Option<f64> {
        let height_m = self.height? / 100.0;
        let weight = self.weight?;
        if height_m <= 0.0 || !height_m.is_finite() || !weight.is_finite() {
            return None;
        }
        Some((weight / (height_m * height_m) * 10.0).round() / 10.0)
    }
}

/// One student's results for one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub id: RecordId,
    pub student_id: StudentId,
    pub year: i32,
    pub gender: Gender,
    pub class_id: ClassId,
    pub grade_id: GradeId,
    #[serde(default)]
    pub measurements: Measurements,
    #[serde(default)]
    pub composite_total: Option<f64>,
    #[serde(default)]
    pub class_rank: Option<u32>,
    #[serde(default)]
    pub grade_rank: Option<u32>,
}

/// A grouping level for ranking and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    Class,
    Grade,
    School,
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeType::Class => write!(f, "class"),
            ScopeType::Grade => write!(f, "grade"),
            ScopeType::School => write!(f, "school"),
        }
    }
}

/// A concrete scope, used both for statistics and as a fetch filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Scope {
    Class(ClassId),
    Grade(GradeId),
    School,
}

impl Scope {
    pub fn scope_type(&self) -> ScopeType {
        match self {
            Scope::Class(_) => ScopeType::Class,
            Scope::Grade(_) => ScopeType::Grade,
            Scope::School => ScopeType::School,
        }
    }

    pub fn id(&self) -> Option<u32> {
        match self {
            Scope::Class(id) | Scope::Grade(id) => Some(*id),
            Scope::School => None,
        }
    }

    /// Whether `record` belongs to this scope.
    pub fn contains(&self, record: &MeasurementRecord) -> bool {
        match self {
            Scope::Class(id) => record.class_id == *id,
            Scope::Grade(id) => record.grade_id == *id,
            Scope::School => true,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Class(id) => write!(f, "class {id}"),
            Scope::Grade(id) => write!(f, "grade {id}"),
            Scope::School => write!(f, "school"),
        }
    }
}

/// A rank produced by one ranking run. Never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankAssignment {
    pub record_id: RecordId,
    pub scope_id: u32,
    pub scope_type: ScopeType,
    pub rank: u32,
}
