pub mod compare_classes;
pub mod diff;
pub mod evaluate;
pub mod init;
pub mod rank;
pub mod stats;
pub mod trend;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Table};

use fitscore_core::engine::FitnessEngine;
use fitscore_core::statistics::StatSnapshot;
use fitscore_store::{create_engine, load_config_from, FitscoreConfig, InMemoryStore};

/// A loaded configuration with its engine and backing store.
pub struct Session {
    pub config: FitscoreConfig,
    pub engine: FitnessEngine,
    pub store: Arc<InMemoryStore>,
}

impl Session {
    pub fn open(config_path: Option<PathBuf>) -> Result<Self> {
        let config = load_config_from(config_path.as_deref())?;
        let (engine, store) = create_engine(&config)?;
        tracing::debug!(
            rules = %config.rules_path.display(),
            dataset = %config.dataset_path.display(),
            "session opened"
        );
        Ok(Self {
            config,
            engine,
            store,
        })
    }

    /// Write the store back to the configured dataset file.
    pub async fn persist(&self) -> Result<()> {
        self.store
            .to_dataset()
            .await
            .save_json(&self.config.dataset_path)?;
        eprintln!("Dataset saved to: {}", self.config.dataset_path.display());
        Ok(())
    }
}

pub fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

/// One row per snapshot: scope, population, submissions and tier rates.
pub fn snapshot_table(snapshots: &[StatSnapshot]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Scope",
        "Students",
        "Submitted",
        "Average",
        "Excellent",
        "Good",
        "Pass",
        "Fail",
    ]);
    for s in snapshots {
        table.add_row(vec![
            Cell::new(s.scope),
            Cell::new(s.total_students),
            Cell::new(format!("{} ({})", s.submitted_count, percent(s.submission_rate))),
            Cell::new(format!("{:.2}", s.average_score)),
            Cell::new(percent(s.excellent_rate)),
            Cell::new(percent(s.good_rate)),
            Cell::new(percent(s.pass_rate)),
            Cell::new(percent(s.fail_rate)),
        ]);
    }
    table
}

/// Markdown version of [`snapshot_table`].
pub fn snapshot_markdown(snapshots: &[StatSnapshot]) -> String {
    let mut md = String::from("| Scope | Students | Submitted | Average | Excellent | Pass |\n");
    md.push_str("|-------|----------|-----------|---------|-----------|------|\n");
    for s in snapshots {
        md.push_str(&format!(
            "| {} | {} | {} | {:.2} | {} | {} |\n",
            s.scope,
            s.total_students,
            s.submitted_count,
            s.average_score,
            percent(s.excellent_rate),
            percent(s.pass_rate)
        ));
    }
    md
}
