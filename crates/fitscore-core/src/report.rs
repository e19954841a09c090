//! Statistics reports with JSON persistence and decline detection.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evaluation::round_to;
use crate::model::Scope;
use crate::statistics::StatSnapshot;

/// A saved set of snapshots for one year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    pub year: i32,
    pub snapshots: Vec<StatSnapshot>,
}

impl StatsReport {
    pub fn new(year: i32, snapshots: Vec<StatSnapshot>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            year,
            snapshots,
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: StatsReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Compare average scores per scope against a baseline.
    ///
    /// A scope declines when its average drops by more than `threshold`
    /// points and improves when it rises by more than that.
    pub fn compare(&self, baseline: &StatsReport, threshold: f64) -> SnapshotComparison {
        let index = |report: &StatsReport| -> BTreeMap<Scope, StatSnapshot> {
            report
                .snapshots
                .iter()
                .map(|s| (s.scope, s.clone()))
                .collect()
        };
        let before = index(baseline);
        let after = index(self);

        let mut comparison = SnapshotComparison {
            baseline_year: baseline.year,
            current_year: self.year,
            ..Default::default()
        };

        for (scope, current) in &after {
            let Some(previous) = before.get(scope) else {
                comparison.new_scopes.push(*scope);
                continue;
            };
            let change = ScopeChange {
                scope: *scope,
                baseline_average: previous.average_score,
                current_average: current.average_score,
                delta: round_to(current.average_score - previous.average_score, 2),
                pass_rate_delta: round_to(current.pass_rate - previous.pass_rate, 4),
            };
            if change.delta < -threshold {
                comparison.declines.push(change);
            } else if change.delta > threshold {
                comparison.improvements.push(change);
            } else {
                comparison.unchanged += 1;
            }
        }

        comparison.removed_scopes = before
            .keys()
            .filter(|s| !after.contains_key(s))
            .copied()
            .collect();

        comparison
    }
}

/// Result of comparing two reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotComparison {
    pub baseline_year: i32,
    pub current_year: i32,
    /// Scopes whose average went down.
    pub declines: Vec<ScopeChange>,
    /// Scopes whose average went up.
    pub improvements: Vec<ScopeChange>,
    /// Scopes with no significant change.
    pub unchanged: usize,
    /// Scopes in current but not baseline.
    pub new_scopes: Vec<Scope>,
    /// Scopes in baseline but not current.
    pub removed_scopes: Vec<Scope>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeChange {
    pub scope: Scope,
    pub baseline_average: f64,
    pub current_average: f64,
    pub delta: f64,
    pub pass_rate_delta: f64,
}

impl SnapshotComparison {
    /// Format the comparison as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**{} vs {}:** {} declines, {} improvements, {} unchanged\n\n",
            self.current_year,
            self.baseline_year,
            self.declines.len(),
            self.improvements.len(),
            self.unchanged
        ));

        for (title, changes) in [
            ("Declines", &self.declines),
            ("Improvements", &self.improvements),
        ] {
            if changes.is_empty() {
                continue;
            }
            md.push_str(&format!("### {title}\n\n"));
            md.push_str("| Scope | Baseline | Current | Delta | Pass rate |\n");
            md.push_str("|-------|----------|---------|-------|-----------|\n");
            for c in changes {
                md.push_str(&format!(
                    "| {} | {:.2} | {:.2} | {:+.2} | {:+.1}% |\n",
                    c.scope,
                    c.baseline_average,
                    c.current_average,
                    c.delta,
                    c.pass_rate_delta * 100.0
                ));
            }
            md.push('\n');
        }

        if !self.new_scopes.is_empty() || !self.removed_scopes.is_empty() {
            let list = |scopes: &[Scope]| {
                scopes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            md.push_str(&format!(
                "New: {}. Removed: {}.\n",
                if self.new_scopes.is_empty() { "none".into() } else { list(&self.new_scopes) },
                if self.removed_scopes.is_empty() { "none".into() } else { list(&self.removed_scopes) },
            ));
        }

        md
    }

    /// Returns true if any scope declined.
    pub fn has_declines(&self) -> bool {
        !self.declines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::summarize;
    use crate::testing::record;

    fn snapshot(scope: Scope, totals: &[f64]) -> StatSnapshot {
        let class_id = scope.id().unwrap_or(1);
        let records: Vec<_> = totals
            .iter()
            .enumerate()
            .map(|(i, &t)| record(i as u64 + 1, class_id, 7, Some(t)))
            .collect();
        summarize(scope, 2024, totals.len(), &records, None)
    }

    fn report(year: i32, snapshots: Vec<StatSnapshot>) -> StatsReport {
        StatsReport {
            id: Uuid::nil(),
            created_at: Utc::now(),
            year,
            snapshots,
        }
    }

    #[test]
    fn compare_identical_reports() {
        let r = report(2024, vec![snapshot(Scope::Class(1), &[80.0, 70.0])]);
        let cmp = r.compare(&r.clone(), 0.5);
        assert!(cmp.declines.is_empty());
        assert!(cmp.improvements.is_empty());
        assert_eq!(cmp.unchanged, 1);
        assert!(!cmp.has_declines());
    }

    #[test]
    fn compare_detects_decline_and_improvement() {
        let baseline = report(
            2023,
            vec![
                snapshot(Scope::Class(1), &[80.0, 70.0]),
                snapshot(Scope::Class(2), &[60.0]),
            ],
        );
        let current = report(
            2024,
            vec![
                snapshot(Scope::Class(1), &[70.0, 50.0]),
                snapshot(Scope::Class(2), &[61.0]),
            ],
        );

        let cmp = current.compare(&baseline, 0.5);
        assert_eq!(cmp.declines.len(), 1);
        assert_eq!(cmp.declines[0].scope, Scope::Class(1));
        assert_eq!(cmp.declines[0].delta, -15.0);
        assert_eq!(cmp.declines[0].pass_rate_delta, -0.5);
        assert_eq!(cmp.improvements.len(), 1);
        assert!(cmp.has_declines());

        let loose = current.compare(&baseline, 20.0);
        assert_eq!(loose.unchanged, 2);
    }

    #[test]
    fn compare_with_new_and_removed() {
        let baseline = report(2023, vec![snapshot(Scope::Class(1), &[80.0])]);
        let current = report(2024, vec![snapshot(Scope::Class(2), &[80.0])]);

        let cmp = current.compare(&baseline, 0.5);
        assert_eq!(cmp.new_scopes, vec![Scope::Class(2)]);
        assert_eq!(cmp.removed_scopes, vec![Scope::Class(1)]);
    }

    #[test]
    fn json_roundtrip() {
        let report = report(2024, vec![snapshot(Scope::School, &[90.0, 55.0])]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/report.json");

        report.save_json(&path).unwrap();
        let loaded = StatsReport::load_json(&path).unwrap();

        assert_eq!(loaded.year, 2024);
        assert_eq!(loaded.snapshots, report.snapshots);
    }

    #[test]
    fn markdown_output() {
        let baseline = report(2023, vec![snapshot(Scope::Grade(7), &[80.0])]);
        let current = report(2024, vec![snapshot(Scope::Grade(7), &[60.0])]);

        let md = current.compare(&baseline, 0.5).to_markdown();
        assert!(md.contains("Declines"));
        assert!(md.contains("grade 7"));
        assert!(md.contains("-20.00"));
    }
}
