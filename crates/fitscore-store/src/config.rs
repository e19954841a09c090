//! Configuration loading and engine factory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use fitscore_core::engine::{EngineConfig, FitnessEngine};
use fitscore_core::evaluation::{EvaluationConfig, ItemWeights};
use fitscore_core::model::Item;
use fitscore_core::parser::load_rules;

use crate::dataset::Dataset;
use crate::memory::InMemoryStore;

/// Top-level fitscore configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitscoreConfig {
    /// Rule catalog file or directory of `.toml` rule files.
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,
    /// JSON dataset with rosters and records.
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,
    /// Where stats reports are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Max concurrent class partitions during a rank recompute.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Reject overlapping active rules instead of picking the newest.
    #[serde(default)]
    pub strict_rules: bool,
    /// Per-item composite weights. Absent means the national standard
    /// weights; an empty `[weights]` table means a plain sum.
    #[serde(default = "default_weights")]
    pub weights: Option<ItemWeights>,
    /// Per-item `[min, max]` overrides of the built-in sanity ranges.
    #[serde(default)]
    pub sanity: BTreeMap<Item, (f64, f64)>,
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("rules")
}
fn default_dataset_path() -> PathBuf {
    PathBuf::from("dataset.json")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./fitscore-reports")
}
fn default_parallelism() -> usize {
    4
}
fn default_weights() -> Option<ItemWeights> {
    Some(ItemWeights::national_standard())
}

impl Default for FitscoreConfig {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
            dataset_path: default_dataset_path(),
            output_dir: default_output_dir(),
            parallelism: default_parallelism(),
            strict_rules: false,
            weights: default_weights(),
            sanity: BTreeMap::new(),
        }
    }
}

impl FitscoreConfig {
    /// The validated engine settings.
    pub fn to_engine_config(&self) -> Result<EngineConfig> {
        let config = EngineConfig {
            parallelism: self.parallelism,
            evaluation: EvaluationConfig {
                weights: self.weights.clone().filter(|w| !w.0.is_empty()),
                sanity: self.sanity.clone(),
            },
            strict_rules: self.strict_rules,
        };
        config.validate().context("invalid engine configuration")?;
        Ok(config)
    }

    /// Apply `FITSCORE_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup("FITSCORE_DATASET") {
            self.dataset_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("FITSCORE_RULES") {
            self.rules_path = PathBuf::from(path);
        }
        if let Some(n) = lookup("FITSCORE_PARALLELISM") {
            self.parallelism = n
                .trim()
                .parse()
                .with_context(|| format!("FITSCORE_PARALLELISM is not a number: {n}"))?;
        }
        Ok(())
    }

    fn resolve_paths(&mut self) {
        for path in [
            &mut self.rules_path,
            &mut self.dataset_path,
            &mut self.output_dir,
        ] {
            *path = PathBuf::from(resolve_env_vars(&path.to_string_lossy()));
        }
    }
}

/// Expand `${NAME}` with the value of environment variable `NAME` (empty if unset).
///
/// An unterminated `${` is kept as written.
fn resolve_env_vars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find("${") {
        let Some(len) = rest[open + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(&std::env::var(&rest[open + 2..open + 2 + len]).unwrap_or_default());
        rest = &rest[open + 3 + len..];
    }
    out.push_str(rest);
    out
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `fitscore.toml` in the current directory
/// 2. `~/.config/fitscore/config.toml`
///
/// Environment variable overrides: `FITSCORE_DATASET`, `FITSCORE_RULES`,
/// `FITSCORE_PARALLELISM`.
pub fn load_config() -> Result<FitscoreConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<FitscoreConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("fitscore.toml");
        if local.exists() {
            Some(local)
        } else {
            user_config_dir()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match &config_path {
        Some(path) => parse_config_file(path)?,
        None => FitscoreConfig::default(),
    };
    tracing::debug!(path = ?config_path, "configuration loaded");

    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.resolve_paths();
    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<FitscoreConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<FitscoreConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn user_config_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("fitscore"))
}

/// Build an engine over an [`InMemoryStore`] filled from the configured files.
///
/// A missing rules path or dataset file yields an empty catalog or store
/// with a warning; unreadable files are errors.
pub fn create_engine(config: &FitscoreConfig) -> Result<(FitnessEngine, Arc<InMemoryStore>)> {
    let engine_config = config.to_engine_config()?;

    let rules = if config.rules_path.exists() {
        load_rules(&config.rules_path)?
    } else {
        tracing::warn!(
            "rules path {} does not exist, no item will be graded",
            config.rules_path.display()
        );
        Vec::new()
    };

    let dataset = if config.dataset_path.exists() {
        Dataset::load_json(&config.dataset_path)?
    } else {
        tracing::warn!(
            "dataset {} does not exist, starting empty",
            config.dataset_path.display()
        );
        Dataset::default()
    };

    tracing::debug!(
        rules = rules.len(),
        classes = dataset.classes.len(),
        records = dataset.records.len(),
        "store loaded"
    );
    let store = Arc::new(InMemoryStore::from_dataset(dataset, rules)?);
    let engine = FitnessEngine::from_store(Arc::clone(&store), engine_config);
    Ok((engine, store))
}
