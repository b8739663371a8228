//! Engine configuration
//!
//! Loaded from a TOML file when one is given and present, then overridden by
//! `MATCHDAY_*` environment variables.

use matchday_ai_trainer::{ForestConfig, GbdtConfig, LogisticConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{EngineError, Result};

pub const ENV_MODEL_DIR: &str = "MATCHDAY_MODEL_DIR";
pub const ENV_PORT: &str = "MATCHDAY_PORT";
pub const ENV_BIND: &str = "MATCHDAY_BIND";
pub const ENV_CACHE_TTL_SECS: &str = "MATCHDAY_CACHE_TTL_SECS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub training: TrainingConfig,
    pub prediction: PredictionConfig,
    pub service: ServiceConfig,
}

/// Where bundles live on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub model_dir: PathBuf,
    /// Bundle directories kept after a save, the current one included
    pub retain_bundles: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./models"),
            retain_bundles: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub n_samples: usize,
    pub n_features: usize,
    pub seed: u64,
    pub validation_fraction: f64,
    /// Labelled CSV to train from; synthetic games when unset
    pub data_path: Option<PathBuf>,
    /// Fit a bundle during initialize when none can be loaded
    pub train_on_startup: bool,
    pub boosted_trees: GbdtConfig,
    pub logistic: LogisticConfig,
    pub random_forest: ForestConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_samples: 5000,
            n_features: 25,
            seed: 42,
            validation_fraction: 0.2,
            data_path: None,
            train_on_startup: true,
            boosted_trees: GbdtConfig::default(),
            logistic: LogisticConfig::default(),
            random_forest: ForestConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub cache_ttl_secs: u64,
    /// Entry limit for the in-process cache
    pub cache_max_entries: usize,
    /// Points per unit of win probability above 0.5
    pub spread_scale: f64,
    pub total_range: (f64, f64),
    /// Overall confidence when win probability was not requested
    pub default_confidence: f64,
    pub max_concurrent: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            cache_max_entries: 10_000,
            spread_scale: 20.0,
            total_range: (200.0, 240.0),
            default_confidence: 0.5,
            max_concurrent: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind: String,
    pub port: u16,
    /// JSON object of game id to structured features, served by id lookups
    pub games_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3002,
            games_file: None,
        }
    }
}

impl EngineConfig {
    /// Load from `path` (if given and present) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => Self::from_file(p)?,
            Some(p) => {
                tracing::warn!(path = %p.display(), "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            EngineError::Config(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var(ENV_MODEL_DIR) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                self.store.model_dir = PathBuf::from(trimmed);
            }
        }

        if let Ok(value) = env::var(ENV_PORT) {
            match value.trim().parse::<u16>() {
                Ok(parsed) => self.service.port = parsed,
                Err(_) => tracing::warn!(%value, "Ignoring invalid {}", ENV_PORT),
            }
        }

        if let Ok(value) = env::var(ENV_BIND) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                self.service.bind = trimmed.to_string();
            }
        }

        if let Ok(value) = env::var(ENV_CACHE_TTL_SECS) {
            match value.trim().parse::<u64>() {
                Ok(parsed) => self.prediction.cache_ttl_secs = parsed,
                Err(_) => tracing::warn!(%value, "Ignoring invalid {}", ENV_CACHE_TTL_SECS),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(EngineError::Config(msg));

        let t = &self.training;
        if t.n_samples < 10 || t.n_features == 0 {
            return fail(format!(
                "training needs at least 10 samples and 1 feature, got {} x {}",
                t.n_samples, t.n_features
            ));
        }
        if !(t.validation_fraction > 0.0 && t.validation_fraction < 1.0) {
            return fail(format!(
                "validation_fraction must be in (0, 1), got {}",
                t.validation_fraction
            ));
        }
        for (name, fraction) in [
            ("bagging_fraction", t.boosted_trees.bagging_fraction),
            ("feature_fraction", t.boosted_trees.feature_fraction),
        ] {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return fail(format!("{name} must be in (0, 1], got {fraction}"));
            }
        }
        if !(t.boosted_trees.learning_rate > 0.0) || !(t.logistic.c > 0.0) {
            return fail("learning_rate and c must be positive".to_string());
        }

        let p = &self.prediction;
        if !(p.spread_scale > 0.0) {
            return fail(format!("spread_scale must be positive, got {}", p.spread_scale));
        }
        let (lo, hi) = p.total_range;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return fail(format!("total_range must be a non-empty range, got [{lo}, {hi}]"));
        }
        if !(0.0..=1.0).contains(&p.default_confidence) {
            return fail(format!(
                "default_confidence must be in [0, 1], got {}",
                p.default_confidence
            ));
        }
        if p.max_concurrent == 0 || p.cache_max_entries == 0 {
            return fail("max_concurrent and cache_max_entries must be at least 1".to_string());
        }
        if self.store.retain_bundles == 0 {
            return fail("retain_bundles must be at least 1".to_string());
        }

        Ok(())
    }
}
