//! The `fitscore compare-classes` command.

use std::path::PathBuf;

use anyhow::Result;

use super::{snapshot_markdown, snapshot_table, Session};
use crate::Format;

pub async fn execute(
    config_path: Option<PathBuf>,
    year: i32,
    classes: Vec<u32>,
    format: Format,
) -> Result<()> {
    let session = Session::open(config_path)?;
    let snapshots = session.engine.compare_classes(&classes, year).await?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&snapshots)?),
        Format::Markdown => println!("{}", snapshot_markdown(&snapshots)),
        Format::Text => println!("{}", snapshot_table(&snapshots)),
    }
    Ok(())
}
