//! Grading, ranking and statistics for school fitness tests.
//!
//! Raw measurements are graded against year-, grade- and gender-specific
//! standards, folded into a composite total per student-year, ranked within
//! class and grade, and rolled up into class/grade/school statistics and
//! multi-year trends. Storage is reached through the traits in [`traits`].

pub mod catalog;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod parser;
pub mod ranking;
pub mod report;
pub mod statistics;
pub mod traits;
pub mod trend;

#[cfg(test)]
mod testing;
