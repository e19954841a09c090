//! TOML grading rule parser.
//!
//! Loads grading rule catalogs from TOML files and directories, and validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::catalog::{validate_rule, StandardCatalog};
use crate::model::{Gender, GradeId, GradingRule, Item};

/// Intermediate TOML structure for rule catalog files.
#[derive(Debug, Deserialize)]
struct TomlRuleFile {
    #[serde(default)]
    catalog: Option<TomlCatalogHeader>,
    #[serde(default)]
    rules: Vec<TomlRule>,
}

#[derive(Debug, Deserialize)]
struct TomlCatalogHeader {
    /// Year applied to rules that omit their own.
    #[serde(default)]
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TomlRule {
    id: u64,
    #[serde(default)]
    year: Option<i32>,
    /// `[min, max]` grade levels, inclusive.
    grades: [GradeId; 2],
    gender: String,
    item: String,
    #[serde(default)]
    excellent: Option<f64>,
    #[serde(default)]
    good: Option<f64>,
    #[serde(default)]
    pass: Option<f64>,
    /// Defaults to the item's own direction.
    #[serde(default)]
    time_based: Option<bool>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default = "default_true")]
    active: bool,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// Parse a single TOML file into grading rules.
pub fn parse_rules_file(path: &Path) -> Result<Vec<GradingRule>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rules file: {}", path.display()))?;

    parse_rules_str(&content, path)
}

/// Parse a TOML string into grading rules (useful for testing).
///
/// Rules without `created_at` get the Unix epoch, so among overlapping rules
/// the one with an explicit, later timestamp wins and ties go to the higher id.
pub fn parse_rules_str(content: &str, source_path: &Path) -> Result<Vec<GradingRule>> {
    let parsed: TomlRuleFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    let default_year = parsed.catalog.and_then(|c| c.year);

    parsed
        .rules
        .into_iter()
        .map(|r| {
            let year = r.year.or(default_year).with_context(|| {
                format!(
                    "rule {} in {} has no year and the file sets no [catalog] year",
                    r.id,
                    source_path.display()
                )
            })?;
            let gender: Gender = r
                .gender
                .parse()
                .map_err(|e: String| anyhow::anyhow!("rule {}: {}", r.id, e))?;
            let item: Item = r
                .item
                .parse()
                .map_err(|e: String| anyhow::anyhow!("rule {}: {}", r.id, e))?;

            Ok(GradingRule {
                id: r.id,
                year,
                grade_min: r.grades[0],
                grade_max: r.grades[1],
                gender,
                item,
                excellent: r.excellent,
                good: r.good,
                pass: r.pass,
                is_time_based: r.time_based.unwrap_or_else(|| item.is_timed()),
                unit: r.unit.unwrap_or_else(|| item.default_unit().to_string()),
                active: r.active,
                created_at: r.created_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            })
        })
        .collect()
}

/// Recursively load all `.toml` rule files from a directory.
///
/// Files that fail to parse are skipped with a warning.
pub fn load_rules_directory(dir: &Path) -> Result<Vec<GradingRule>> {
    let mut rules = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            rules.extend(load_rules_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_rules_file(&path) {
                Ok(parsed) => rules.extend(parsed),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(rules)
}

/// Load rules from a file or a directory tree.
pub fn load_rules(path: &Path) -> Result<Vec<GradingRule>> {
    if path.is_dir() {
        load_rules_directory(path)
    } else {
        parse_rules_file(path)
    }
}

/// A warning from rule validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The rule ID (if applicable).
    pub rule_id: Option<u64>,
    /// Warning message.
    pub message: String,
}

/// Validate a rule set for common issues.
pub fn validate_rules(rules: &[GradingRule]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    for rule in rules {
        if !seen_ids.insert(rule.id) {
            warnings.push(ValidationWarning {
                rule_id: Some(rule.id),
                message: format!("duplicate rule ID: {}", rule.id),
            });
        }
    }

    for rule in rules {
        if let Err(e) = validate_rule(rule) {
            warnings.push(ValidationWarning {
                rule_id: Some(rule.id),
                message: e.to_string(),
            });
        }
        if rule.thresholds().iter().all(|(_, t)| t.is_none()) {
            warnings.push(ValidationWarning {
                rule_id: Some(rule.id),
                message: "no thresholds set; every value grades as fail".into(),
            });
        }
        if rule.unit.trim().is_empty() {
            warnings.push(ValidationWarning {
                rule_id: Some(rule.id),
                message: "unit is empty".into(),
            });
        }
        if rule.is_time_based != rule.item.is_timed() {
            warnings.push(ValidationWarning {
                rule_id: Some(rule.id),
                message: format!(
                    "time_based = {} is unusual for {}",
                    rule.is_time_based, rule.item
                ),
            });
        }
    }

    for (first, second) in StandardCatalog::new(rules.to_vec()).overlaps() {
        warnings.push(ValidationWarning {
            rule_id: Some(second),
            message: format!("overlaps active rule {first}; the newest one will be used"),
        });
    }

    warnings
}
