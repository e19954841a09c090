//! The `fitscore diff` command.

use std::path::PathBuf;

use anyhow::Result;

use fitscore_core::report::StatsReport;

use crate::Format;

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    threshold: f64,
    fail_on_decline: bool,
    format: Format,
) -> Result<()> {
    anyhow::ensure!(threshold >= 0.0, "threshold must not be negative");
    let baseline = StatsReport::load_json(&baseline_path)?;
    let current = StatsReport::load_json(&current_path)?;

    let comparison = current.compare(&baseline, threshold);

    match format {
        Format::Markdown => println!("{}", comparison.to_markdown()),
        Format::Json => println!("{}", serde_json::to_string_pretty(&comparison)?),
        Format::Text => {
            println!(
                "Comparison {} vs {}: {} declines, {} improvements, {} unchanged",
                comparison.current_year,
                comparison.baseline_year,
                comparison.declines.len(),
                comparison.improvements.len(),
                comparison.unchanged
            );

            for (title, changes) in [
                ("Declines", &comparison.declines),
                ("Improvements", &comparison.improvements),
            ] {
                if changes.is_empty() {
                    continue;
                }
                println!("\n{title}:");
                for c in changes {
                    println!(
                        "  {} {:.2} -> {:.2} ({:+.2}, pass rate {:+.1}%)",
                        c.scope,
                        c.baseline_average,
                        c.current_average,
                        c.delta,
                        c.pass_rate_delta * 100.0
                    );
                }
            }

            if !comparison.new_scopes.is_empty() {
                println!("\n{} new scope(s)", comparison.new_scopes.len());
            }
            if !comparison.removed_scopes.is_empty() {
                println!("{} removed scope(s)", comparison.removed_scopes.len());
            }
        }
    }

    if fail_on_decline && comparison.has_declines() {
        std::process::exit(1);
    }

    Ok(())
}
