//! The `fitscore evaluate` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use fitscore_core::evaluation::{ItemOutcome, ScoredRecord};

use super::Session;
use crate::Format;

pub async fn execute(
    config_path: Option<PathBuf>,
    year: i32,
    student: Option<u64>,
    save: bool,
    format: Format,
) -> Result<()> {
    let session = Session::open(config_path)?;

    let mut scored = session.engine.evaluate_year(year).await?;
    if let Some(student) = student {
        scored.retain(|s| s.student_id == student);
        anyhow::ensure!(!scored.is_empty(), "no record for student {student} in {year}");
    }

    if save {
        for s in &scored {
            if let Some(record) = session.store.record(s.record_id).await {
                session.engine.submit(&record).await?;
            }
        }
        session.persist().await?;
    }

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&scored)?),
        _ => print_scored(&scored),
    }

    Ok(())
}

fn print_scored(scored: &[ScoredRecord]) {
    let mut table = Table::new();
    table.set_header(vec!["Record", "Student", "Scored", "Issues", "Score"]);

    let mut issues = Vec::new();
    for s in scored {
        let problems: Vec<String> = s
            .items
            .iter()
            .filter_map(|e| match &e.outcome {
                ItemOutcome::Scored { .. } => None,
                ItemOutcome::NotApplicable => Some(format!("{}: no standard", e.item)),
                ItemOutcome::Invalid { reason } => Some(reason.clone()),
            })
            .collect();
        let score = s
            .composite
            .and_then(|c| c.score())
            .map(|v| format!("{v:.2}"))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(s.record_id),
            Cell::new(s.student_id),
            Cell::new(s.scored().count()),
            Cell::new(problems.len()),
            Cell::new(score),
        ]);
        issues.extend(problems.into_iter().map(|p| (s.record_id, p)));
    }

    println!("{table}");
    for (record, issue) in issues {
        println!("  [{record}] {issue}");
    }
    println!("{} record(s) evaluated.", scored.len());
}
