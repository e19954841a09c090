//! Engine error types.
//!
//! Item-level errors are collected next to partial results; the rest abort
//! the call they occur in.

use thiserror::Error;

use crate::model::{Gender, GradeId, Item, ScopeType};

/// Errors produced by the grading, ranking and statistics engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No active grading rule matches the item for this student.
    #[error("no grading standard for {item} (year {year}, grade {grade}, {gender})")]
    NotApplicableStandard {
        item: Item,
        year: i32,
        grade: GradeId,
        gender: Gender,
    },

    /// A raw value failed its sanity bound.
    #[error("invalid {item} measurement {value}: {reason}")]
    InvalidMeasurement {
        item: Item,
        value: f64,
        reason: String,
    },

    /// A requested class, grade or student does not exist.
    #[error("unknown {scope_type} {id}")]
    UnknownScope { scope_type: ScopeType, id: u64 },

    /// A ranking recompute for this year is already running.
    #[error("ranking recompute for {year} is already in progress")]
    ConcurrentRecompute { year: i32 },

    /// A grading rule breaks the threshold ordering or grade range invariants.
    #[error("invalid grading rule {rule_id}: {message}")]
    InvalidRule { rule_id: u64, message: String },

    /// Two active rules compete for the same lookup key.
    #[error("grading rules {first} and {second} overlap")]
    OverlappingRules { first: u64, second: u64 },

    #[error("invalid year range {start}..={end}")]
    InvalidYearRange { start: i32, end: i32 },

    /// A storage collaborator failed.
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    /// Returns `true` for errors that only disqualify a single item.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            EngineError::NotApplicableStandard { .. } | EngineError::InvalidMeasurement { .. }
        )
    }

    pub(crate) fn unknown(scope_type: ScopeType, id: u32) -> Self {
        EngineError::UnknownScope {
            scope_type,
            id: u64::from(id),
        }
    }
}
