//! Model store
//!
//! Persists a [`ModelBundle`] as five artifacts in a versioned directory:
//!
//! ```text
//! <model_dir>/CURRENT                      bundle id of the live bundle
//! <model_dir>/bundles/<id>/boosted_trees.bin
//! <model_dir>/bundles/<id>/logistic.bin
//! <model_dir>/bundles/<id>/random_forest.bin
//! <model_dir>/bundles/<id>/scaler.bin
//! <model_dir>/bundles/<id>/model_metadata.json
//! ```
//!
//! A save writes into a staging directory, renames it into place and only
//! then swaps `CURRENT`, so an interrupted save leaves the previous bundle
//! live. Loads verify the blake3 digest of every artifact against the
//! metadata before decoding.

use chrono::{DateTime, Utc};
use matchday_ai_core::metrics;
use matchday_ai_core::serialization::{canonical_json_string, decode, digest_hex, encode};
use matchday_ai_core::{BoostedTreesModel, CalibratedLogistic, RandomForestModel, StandardScaler};
use matchday_ai_trainer::{Dataset, EnsembleTrainer, TrainingDataSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{StoreConfig, TrainingConfig};
use crate::ensemble;
use crate::errors::{EngineError, Result};
use crate::explain::rank_features;
use crate::types::{default_ensemble_weights, FeatureImportance, ModelKind, PerformanceMetrics};

pub const CURRENT_FILE: &str = "CURRENT";
pub const BUNDLES_DIR: &str = "bundles";
pub const SCALER_FILE: &str = "scaler.bin";
pub const METADATA_FILE: &str = "model_metadata.json";
const METADATA_FORMAT: u32 = 1;
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Everything needed to score a game. Never mutated once built; replaced
/// wholesale on retrain.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBundle {
    pub boosted: BoostedTreesModel,
    pub logistic: CalibratedLogistic,
    pub forest: RandomForestModel,
    pub scaler: StandardScaler,
    pub feature_names: Vec<String>,
    pub ensemble_weights: BTreeMap<ModelKind, f64>,
    pub last_trained: Option<DateTime<Utc>>,
    pub model_version: String,
    pub performance_metrics: Option<PerformanceMetrics>,
}

impl ModelBundle {
    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    /// Boosted-tree split gain per feature, ranked
    pub fn ranked_importance(&self) -> Vec<FeatureImportance> {
        rank_features(&self.feature_names, &self.boosted.feature_importances)
    }

    /// Weights and model widths must agree with the feature names
    pub fn validate(&self) -> Result<()> {
        validate_weights(&self.ensemble_weights)?;

        let width = self.feature_count();
        if width == 0 {
            return Err(EngineError::CorruptBundle("bundle has no features".to_string()));
        }

        let corrupt = |e: matchday_ai_core::ModelError| EngineError::CorruptBundle(e.to_string());
        self.boosted.validate().map_err(corrupt)?;
        self.logistic.validate().map_err(corrupt)?;
        self.forest.validate().map_err(corrupt)?;
        self.scaler.validate().map_err(corrupt)?;

        for (name, count) in [
            ("boosted_trees", self.boosted.feature_count),
            ("logistic", self.logistic.model.coefficients.len()),
            ("random_forest", self.forest.feature_count),
            ("scaler", self.scaler.feature_count()),
        ] {
            if count != width {
                return Err(EngineError::CorruptBundle(format!(
                    "{name} expects {count} features but bundle names {width}"
                )));
            }
        }
        Ok(())
    }
}

/// Keys must be exactly the three members, each in [0, 1], summing to 1
pub fn validate_weights(weights: &BTreeMap<ModelKind, f64>) -> Result<()> {
    for kind in ModelKind::ALL {
        match weights.get(&kind) {
            Some(w) if (0.0..=1.0).contains(w) => {}
            Some(w) => {
                return Err(EngineError::CorruptBundle(format!(
                    "weight for {} out of range: {w}",
                    kind.as_str()
                )))
            }
            None => {
                return Err(EngineError::CorruptBundle(format!(
                    "missing weight for {}",
                    kind.as_str()
                )))
            }
        }
    }
    let sum: f64 = weights.values().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(EngineError::CorruptBundle(format!(
            "ensemble weights sum to {sum}, expected 1.0"
        )));
    }
    Ok(())
}

/// On-disk description of a bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub format_version: u32,
    pub model_version: String,
    pub last_trained: Option<DateTime<Utc>>,
    pub feature_names: Vec<String>,
    /// Keyed by model identifier
    pub ensemble_weights: BTreeMap<String, f64>,
    pub performance_metrics: Option<PerformanceMetrics>,
    /// Artifact file name to blake3 hex digest
    pub artifacts: BTreeMap<String, String>,
}

fn parse_weights(raw: &BTreeMap<String, f64>) -> Result<BTreeMap<ModelKind, f64>> {
    raw.iter()
        .map(|(key, weight)| {
            ModelKind::ALL
                .into_iter()
                .find(|k| k.as_str() == key)
                .map(|kind| (kind, *weight))
                .ok_or_else(|| EngineError::CorruptBundle(format!("unknown model weight key: {key}")))
        })
        .collect()
}

/// Versioned on-disk bundle storage and training entry point
#[derive(Debug, Clone)]
pub struct ModelStore {
    config: StoreConfig,
    training: TrainingConfig,
    feature_names: Vec<String>,
}

impl ModelStore {
    pub fn new(config: StoreConfig, training: TrainingConfig, feature_names: Vec<String>) -> Self {
        Self {
            config,
            training,
            feature_names,
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.config.model_dir
    }

    fn bundles_dir(&self) -> PathBuf {
        self.config.model_dir.join(BUNDLES_DIR)
    }

    /// Id named by `CURRENT`, if any
    pub fn current_bundle_id(&self) -> Result<Option<String>> {
        let pointer = self.config.model_dir.join(CURRENT_FILE);
        match fs::read_to_string(&pointer) {
            Ok(content) => {
                let id = content.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the current bundle. A missing pointer or any missing artifact
    /// gives `Ok(None)`; digest, decode or validation failures give
    /// `CorruptBundle`.
    #[instrument(skip(self), fields(model_dir = %self.config.model_dir.display()))]
    pub fn load(&self) -> Result<Option<ModelBundle>> {
        let Some(id) = self.current_bundle_id()? else {
            debug!("No current bundle pointer");
            return Ok(None);
        };
        let dir = self.bundles_dir().join(&id);

        let mut files: Vec<&str> = ModelKind::ALL.iter().map(|k| k.artifact_name()).collect();
        files.extend([SCALER_FILE, METADATA_FILE]);
        if let Some(missing) = files.iter().find(|f| !dir.join(f).is_file()) {
            warn!(bundle = %id, missing = %missing, "Bundle is incomplete");
            return Ok(None);
        }

        let metadata: BundleMetadata = serde_json::from_slice(&fs::read(dir.join(METADATA_FILE))?)
            .map_err(|e| EngineError::CorruptBundle(format!("unreadable metadata: {e}")))?;
        if metadata.format_version != METADATA_FORMAT {
            return Err(EngineError::CorruptBundle(format!(
                "unsupported metadata format {}",
                metadata.format_version
            )));
        }

        let read_verified = |name: &str| -> Result<Vec<u8>> {
            let bytes = fs::read(dir.join(name))?;
            let expected = metadata
                .artifacts
                .get(name)
                .ok_or_else(|| EngineError::CorruptBundle(format!("no digest recorded for {name}")))?;
            let actual = digest_hex(&bytes);
            if &actual != expected {
                return Err(EngineError::CorruptBundle(format!(
                    "digest mismatch for {name}: expected {expected}, found {actual}"
                )));
            }
            Ok(bytes)
        };
        let corrupt = |e: matchday_ai_core::ModelError| EngineError::CorruptBundle(e.to_string());

        let bundle = ModelBundle {
            boosted: decode(&read_verified(ModelKind::BoostedTrees.artifact_name())?).map_err(corrupt)?,
            logistic: decode(&read_verified(ModelKind::Logistic.artifact_name())?).map_err(corrupt)?,
            forest: decode(&read_verified(ModelKind::RandomForest.artifact_name())?).map_err(corrupt)?,
            scaler: decode(&read_verified(SCALER_FILE)?).map_err(corrupt)?,
            feature_names: metadata.feature_names.clone(),
            ensemble_weights: parse_weights(&metadata.ensemble_weights)?,
            last_trained: metadata.last_trained,
            model_version: metadata.model_version.clone(),
            performance_metrics: metadata.performance_metrics.clone(),
        };
        bundle.validate()?;

        info!(bundle = %id, version = %bundle.model_version, "Loaded model bundle");
        Ok(Some(bundle))
    }

    /// Persist `bundle` as a new version and make it current
    pub fn save(&self, bundle: &ModelBundle) -> Result<PathBuf> {
        let never = AtomicBool::new(false);
        self.save_unless(bundle, &never)?
            .ok_or_else(|| EngineError::Store("save cancelled".to_string()))
    }

    /// Like [`save`](Self::save), but gives up with `Ok(None)` if `cancelled`
    /// is set before `CURRENT` is swapped. A cancelled save leaves no bundle
    /// directory behind and `CURRENT` untouched.
    #[instrument(skip(self, bundle, cancelled), fields(version = %bundle.model_version))]
    pub fn save_unless(&self, bundle: &ModelBundle, cancelled: &AtomicBool) -> Result<Option<PathBuf>> {
        bundle.validate()?;

        let bundles = self.bundles_dir();
        fs::create_dir_all(&bundles)?;

        let id = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%.6f"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let staging = bundles.join(format!(".staging-{id}"));
        fs::create_dir_all(&staging)?;

        let store_err = |e: matchday_ai_core::ModelError| EngineError::Store(e.to_string());
        let artifacts = [
            (ModelKind::BoostedTrees.artifact_name(), encode(&bundle.boosted).map_err(store_err)?),
            (ModelKind::Logistic.artifact_name(), encode(&bundle.logistic).map_err(store_err)?),
            (ModelKind::RandomForest.artifact_name(), encode(&bundle.forest).map_err(store_err)?),
            (SCALER_FILE, encode(&bundle.scaler).map_err(store_err)?),
        ];

        let mut digests = BTreeMap::new();
        for (name, bytes) in &artifacts {
            fs::write(staging.join(name), bytes)?;
            digests.insert(name.to_string(), digest_hex(bytes));
        }

        let metadata = BundleMetadata {
            format_version: METADATA_FORMAT,
            model_version: bundle.model_version.clone(),
            last_trained: bundle.last_trained,
            feature_names: bundle.feature_names.clone(),
            ensemble_weights: bundle
                .ensemble_weights
                .iter()
                .map(|(k, w)| (k.as_str().to_string(), *w))
                .collect(),
            performance_metrics: bundle.performance_metrics.clone(),
            artifacts: digests,
        };
        fs::write(staging.join(METADATA_FILE), canonical_json_string(&metadata)?)?;
        if cancelled.load(Ordering::SeqCst) {
            fs::remove_dir_all(&staging)?;
            info!(bundle = %id, "Save cancelled before commit");
            return Ok(None);
        }

        let final_dir = bundles.join(&id);
        fs::rename(&staging, &final_dir)?;
        if cancelled.load(Ordering::SeqCst) {
            fs::remove_dir_all(&final_dir)?;
            info!(bundle = %id, "Save cancelled before commit");
            return Ok(None);
        }

        let tmp_pointer = self.config.model_dir.join(format!("{CURRENT_FILE}.tmp"));
        fs::write(&tmp_pointer, &id)?;
        fs::rename(&tmp_pointer, self.config.model_dir.join(CURRENT_FILE))?;

        info!(bundle = %id, "Saved model bundle");
        self.prune(&id);
        Ok(Some(final_dir))
    }

    /// Remove old bundles beyond `retain_bundles` and leftover staging dirs
    fn prune(&self, current: &str) {
        let entries = match fs::read_dir(self.bundles_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not list bundles for pruning");
                return;
            }
        };

        let mut versions = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(".staging-") {
                if let Err(e) = fs::remove_dir_all(entry.path()) {
                    warn!(dir = %name, error = %e, "Failed to remove staging dir");
                }
            } else if entry.path().is_dir() {
                versions.push(name);
            }
        }

        versions.sort();
        let excess = versions.len().saturating_sub(self.config.retain_bundles);
        for old in versions.iter().take(excess).filter(|v| v.as_str() != current) {
            match fs::remove_dir_all(self.bundles_dir().join(old)) {
                Ok(()) => debug!(bundle = %old, "Pruned old bundle"),
                Err(e) => warn!(bundle = %old, error = %e, "Failed to prune bundle"),
            }
        }
    }

    /// Fit a fresh bundle on data from `source` and evaluate it on the
    /// validation split with the default weights
    #[instrument(skip(self, source), fields(source = source.name()))]
    pub fn train(
        &self,
        source: &dyn TrainingDataSource,
        n_samples: usize,
        n_features: usize,
    ) -> Result<ModelBundle> {
        if n_features != self.feature_names.len() {
            return Err(EngineError::Config(format!(
                "training for {n_features} features but the builder names {}",
                self.feature_names.len()
            )));
        }

        let split = source.generate(n_samples, n_features)?;
        if split.train.feature_count != n_features {
            return Err(EngineError::Training(format!(
                "source produced {} features, expected {n_features}",
                split.train.feature_count
            )));
        }

        let trainer = EnsembleTrainer::new(
            self.training.boosted_trees.clone(),
            self.training.logistic.clone(),
            self.training.random_forest.clone(),
        );
        let fitted = trainer.fit(&split)?;

        let now = Utc::now();
        let mut bundle = ModelBundle {
            boosted: fitted.boosted,
            logistic: fitted.logistic,
            forest: fitted.forest,
            scaler: fitted.scaler,
            feature_names: self.feature_names.clone(),
            ensemble_weights: default_ensemble_weights(),
            last_trained: Some(now),
            model_version: format!(
                "{}-{}-{}",
                env!("CARGO_PKG_VERSION"),
                now.format("%Y%m%d%H%M%S"),
                &Uuid::new_v4().simple().to_string()[..8]
            ),
            performance_metrics: None,
        };
        bundle.validate()?;
        bundle.performance_metrics = Some(evaluate(&bundle, &split.validation, split.train.len())?);

        if let Some(m) = &bundle.performance_metrics {
            info!(
                accuracy = m.accuracy,
                log_loss = m.log_loss,
                auc_roc = m.auc_roc,
                "Trained model bundle"
            );
        }
        Ok(bundle)
    }
}

fn evaluate(bundle: &ModelBundle, validation: &Dataset, training_samples: usize) -> Result<PerformanceMetrics> {
    let probs = validation
        .features
        .iter()
        .map(|row| ensemble::score(bundle, row).map(|s| s.probability))
        .collect::<Result<Vec<f64>>>()?;
    let labels = &validation.labels;

    Ok(PerformanceMetrics {
        accuracy: metrics::accuracy(labels, &probs),
        log_loss: metrics::log_loss(labels, &probs),
        auc_roc: metrics::roc_auc(labels, &probs).unwrap_or(0.5),
        calibration_score: 1.0 - metrics::brier_score(labels, &probs),
        feature_importance: bundle.ranked_importance(),
        training_samples,
        last_trained: bundle.last_trained,
        model_version: bundle.model_version.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_must_sum_to_one() {
        assert!(validate_weights(&default_ensemble_weights()).is_ok());

        let mut weights = default_ensemble_weights();
        weights.insert(ModelKind::Logistic, 0.31);
        assert!(matches!(
            validate_weights(&weights),
            Err(EngineError::CorruptBundle(_))
        ));

        let mut weights = default_ensemble_weights();
        weights.remove(&ModelKind::RandomForest);
        weights.insert(ModelKind::Logistic, 0.5);
        assert!(validate_weights(&weights).is_err());
    }

    #[test]
    fn unknown_weight_keys_rejected() {
        let raw = BTreeMap::from([("lightgbm".to_string(), 1.0)]);
        assert!(parse_weights(&raw).is_err());

        let raw = BTreeMap::from([
            ("boosted_trees".to_string(), 0.5),
            ("logistic".to_string(), 0.3),
            ("random_forest".to_string(), 0.2),
        ]);
        assert_eq!(parse_weights(&raw).unwrap(), default_ensemble_weights());
    }

    #[test]
    fn empty_directory_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(
            StoreConfig {
                model_dir: dir.path().to_path_buf(),
                retain_bundles: 2,
            },
            TrainingConfig::default(),
            vec!["a".to_string()],
        );
        assert!(store.load().unwrap().is_none());
    }
}
