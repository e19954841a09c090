//! The `fitscore validate` command.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;

use fitscore_core::parser::{load_rules, validate_rules};
use fitscore_store::load_config_from;

pub fn execute(
    config_path: Option<PathBuf>,
    rules_path: Option<PathBuf>,
    deny_warnings: bool,
) -> Result<()> {
    let rules_path = match rules_path {
        Some(path) => path,
        None => load_config_from(config_path.as_deref())?.rules_path,
    };

    let rules = load_rules(&rules_path)?;
    let years: BTreeSet<i32> = rules.iter().map(|r| r.year).collect();
    let years: Vec<String> = years.iter().map(ToString::to_string).collect();
    println!(
        "Rules: {} ({} rules, years {})",
        rules_path.display(),
        rules.len(),
        if years.is_empty() { "-".to_string() } else { years.join(", ") }
    );

    let warnings = validate_rules(&rules);
    for w in &warnings {
        let prefix = w
            .rule_id
            .map(|id| format!("  [rule {id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("All rules valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
        anyhow::ensure!(!deny_warnings, "{} warning(s) in rule catalog", warnings.len());
    }

    Ok(())
}
