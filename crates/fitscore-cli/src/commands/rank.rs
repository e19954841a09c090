//! The `fitscore rank` command.

use std::path::PathBuf;

use anyhow::Result;

use super::Session;

pub async fn execute(config_path: Option<PathBuf>, year: i32) -> Result<()> {
    let session = Session::open(config_path)?;
    let report = session.engine.recompute_rankings(year).await?;
    session.persist().await?;

    println!(
        "Ranked {} record(s) across {} class(es) and {} grade(s) for {year}.",
        report.records_updated, report.classes_updated, report.grades_updated
    );
    if report.records_cleared > 0 {
        println!(
            "{} record(s) without a composite total left unranked.",
            report.records_cleared
        );
    }
    println!("Run {} took {}ms.", report.run_id, report.duration_ms);
    Ok(())
}
