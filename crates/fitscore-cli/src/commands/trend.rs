//! The `fitscore trend` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use fitscore_core::trend::{CancelFlag, TrendScope, TrendSeries};

use super::{percent, Session};
use crate::Format;

pub async fn execute(
    config_path: Option<PathBuf>,
    from: i32,
    to: i32,
    grade: Option<u32>,
    format: Format,
) -> Result<()> {
    let session = Session::open(config_path)?;
    let scope = grade.map_or(TrendScope::School, TrendScope::Grade);

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let series = session.engine.trend(scope, from, to, Some(&cancel)).await;
    watcher.abort();
    let series = series?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&series)?),
        _ => print_series(&series),
    }
    Ok(())
}

fn print_series(series: &TrendSeries) {
    let mut table = Table::new();
    table.set_header(vec!["Year", "Students", "Average", "Change", "Excellent", "Pass"]);

    let deltas = series.deltas();
    for (i, p) in series.points.iter().enumerate() {
        let change = if i == 0 {
            "-".to_string()
        } else {
            format!("{:+.2}", deltas[i - 1].1)
        };
        table.add_row(vec![
            Cell::new(p.year),
            Cell::new(p.total_students),
            Cell::new(format!("{:.2}", p.average_score)),
            Cell::new(change),
            Cell::new(percent(p.excellent_rate)),
            Cell::new(percent(p.pass_rate)),
        ]);
    }

    println!("{table}");
    if series.cancelled {
        println!(
            "Interrupted after {} of {} year(s).",
            series.points.len(),
            i64::from(series.end_year) - i64::from(series.start_year) + 1
        );
    }
}
