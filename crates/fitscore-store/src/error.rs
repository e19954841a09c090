//! Store error types.

use thiserror::Error;

use fitscore_core::model::{ClassId, RecordId, StudentId};

/// Errors raised by the bundled stores when data would become inconsistent.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Two classes share an id.
    #[error("duplicate class id {0}")]
    DuplicateClass(ClassId),

    /// Two records share an id.
    #[error("duplicate record id {0}")]
    DuplicateRecord(RecordId),

    /// A student already has a different record for the year.
    #[error("student {student_id} already has record {existing} for {year}")]
    DuplicateStudentYear {
        student_id: StudentId,
        year: i32,
        existing: RecordId,
    },

    /// A rank write-back names a record the store does not hold.
    #[error("unknown record {0}")]
    UnknownRecord(RecordId),
}
