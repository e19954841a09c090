//! The `fitscore stats` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use fitscore_core::report::StatsReport;
use fitscore_core::statistics::{ratio, StatSnapshot};

use super::{percent, snapshot_markdown, snapshot_table, Session};
use crate::Format;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    config_path: Option<PathBuf>,
    year: i32,
    class: Option<u32>,
    grade: Option<u32>,
    grades: bool,
    save: bool,
    format: Format,
) -> Result<()> {
    let session = Session::open(config_path)?;
    let engine = &session.engine;

    let snapshots = match (class, grade) {
        (Some(class_id), _) => vec![engine.class_statistics(class_id, year).await?],
        (None, Some(grade_id)) => vec![engine.grade_statistics(grade_id, year).await?],
        (None, None) if grades => engine.grade_ranking(year).await?,
        (None, None) => vec![engine.school_statistics(year).await?],
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&snapshots)?),
        Format::Markdown => println!("{}", snapshot_markdown(&snapshots)),
        Format::Text => {
            println!("{}", snapshot_table(&snapshots));
            for s in &snapshots {
                if !s.items.is_empty() {
                    println!("\n{} items:\n{}", s.scope, item_table(s));
                }
            }
        }
    }

    if save {
        let report = full_report(&session, year).await?;
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
        let path = session
            .config
            .output_dir
            .join(format!("stats-{year}-{timestamp}.json"));
        report.save_json(&path)?;
        eprintln!("Report saved to: {}", path.display());
    }

    Ok(())
}

/// School, every grade and every class with a roster.
async fn full_report(session: &Session, year: i32) -> Result<StatsReport> {
    let engine = &session.engine;
    let mut snapshots = vec![engine.school_statistics(year).await?];
    snapshots.extend(engine.grade_ranking(year).await?);

    let class_ids: Vec<u32> = session
        .store
        .to_dataset()
        .await
        .classes
        .iter()
        .map(|c| c.id)
        .collect();
    snapshots.extend(engine.compare_classes(&class_ids, year).await?);

    Ok(StatsReport::new(year, snapshots))
}

fn item_table(snapshot: &StatSnapshot) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Item",
        "Measured",
        "Average",
        "Min",
        "Max",
        "Excellent",
        "Good",
        "Pass",
        "Fail",
        "Ungraded",
    ]);
    for b in &snapshot.items {
        let graded = b.tiers.total();
        table.add_row(vec![
            Cell::new(b.item),
            Cell::new(b.measured),
            Cell::new(format!("{:.2}", b.average)),
            Cell::new(b.min),
            Cell::new(b.max),
            Cell::new(format!("{} ({})", b.tiers.excellent, percent(ratio(b.tiers.excellent, graded)))),
            Cell::new(b.tiers.good),
            Cell::new(b.tiers.pass),
            Cell::new(b.tiers.fail),
            Cell::new(b.ungraded),
        ]);
    }
    table
}
