//! Prediction orchestrator
//!
//! [`PredictionEngine`] owns the live [`ModelBundle`] and serves predictions
//! through the cache, the feature builder and the ensemble. Any failure past
//! the initialization check degrades to a demo result.

use chrono::Utc;
use futures::future::join_all;
use matchday_ai_trainer::{CsvTrainingData, MockTrainingData, TrainingDataSource};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::cache::{cache_key, PredictionCache};
use crate::config::{EngineConfig, PredictionConfig, TrainingConfig};
use crate::ensemble::{self, EnsembleScore};
use crate::errors::{EngineError, Result};
use crate::explain::{build_explanation, generic_explanation};
use crate::fallback::{demo_model_info, demo_performance_metrics, demo_predict, DEMO_VERSION};
use crate::features::{FeatureBuilder, FeatureVector};
use crate::store::{ModelBundle, ModelStore};
use crate::types::{
    BatchEntry, BatchPredictionRequest, BatchPredictionResponse, FeatureInfo, HealthReport,
    HealthStatus, ModelInfo, PerformanceMetrics, PredictionKind, PredictionPayload,
    PredictionRequest, PredictionResult, ScoreSource,
};

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Loading,
    Trained,
    DemoMode,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Loading => "loading",
            EngineState::Trained => "trained",
            EngineState::DemoMode => "demo_mode",
        }
    }
}

/// Training data named by the config: a CSV file when `data_path` is set,
/// synthetic games otherwise
pub fn training_source(config: &TrainingConfig) -> Arc<dyn TrainingDataSource> {
    match &config.data_path {
        Some(path) => Arc::new(CsvTrainingData {
            path: path.clone(),
            seed: config.seed,
            validation_fraction: config.validation_fraction,
        }),
        None => Arc::new(MockTrainingData {
            seed: config.seed,
            validation_fraction: config.validation_fraction,
        }),
    }
}

/// A result plus the error that forced it to fall back, if any
struct Prediction {
    result: PredictionResult,
    fallback: Option<EngineError>,
}

/// Clears the retrain flag when the retrain task ends or is dropped
struct RetrainGuard(Arc<AtomicBool>);

impl Drop for RetrainGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Background retrain started by [`PredictionEngine::retrain`]
pub struct RetrainHandle {
    task: JoinHandle<Result<ModelInfo>>,
    cancelled: Arc<AtomicBool>,
}

impl RetrainHandle {
    /// Wait for the retrain and return the info of the installed bundle
    pub async fn wait(self) -> Result<ModelInfo> {
        self.task.await?
    }

    /// Ask the retrain to stop. Fitting already under way runs to the end
    /// and is discarded; the retrain flag stays set until it does. Has no
    /// effect once the new bundle has been committed to `CURRENT`.
    pub fn abort(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct PredictionEngine {
    config: PredictionConfig,
    training: TrainingConfig,
    store: Arc<ModelStore>,
    builder: Arc<dyn FeatureBuilder>,
    cache: Option<Arc<dyn PredictionCache>>,
    training_source: Arc<dyn TrainingDataSource>,
    bundle: RwLock<Option<Arc<ModelBundle>>>,
    state: RwLock<EngineState>,
    retraining: Arc<AtomicBool>,
}

impl PredictionEngine {
    pub fn new(
        config: &EngineConfig,
        builder: Arc<dyn FeatureBuilder>,
        cache: Option<Arc<dyn PredictionCache>>,
        training_source: Arc<dyn TrainingDataSource>,
    ) -> Self {
        let store = ModelStore::new(
            config.store.clone(),
            config.training.clone(),
            builder.feature_names(),
        );
        Self {
            config: config.prediction.clone(),
            training: config.training.clone(),
            store: Arc::new(store),
            builder,
            cache,
            training_source,
            bundle: RwLock::new(None),
            state: RwLock::new(EngineState::Uninitialized),
            retraining: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Bundle in use right now; callers keep it for the whole request
    pub fn current_bundle(&self) -> Option<Arc<ModelBundle>> {
        self.bundle.read().clone()
    }

    pub fn is_retraining(&self) -> bool {
        self.retraining.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: EngineState) {
        *self.state.write() = state;
    }

    fn install(&self, bundle: Arc<ModelBundle>) {
        *self.bundle.write() = Some(bundle);
        self.set_state(EngineState::Trained);
    }

    fn ensure_initialized(&self) -> Result<()> {
        match self.state() {
            EngineState::Uninitialized => Err(EngineError::NotInitialized),
            _ => Ok(()),
        }
    }

    /// Load the current bundle, or train and persist one. Ends in `Trained`
    /// or `DemoMode`; never fails.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> EngineState {
        match self.state() {
            EngineState::Uninitialized => self.set_state(EngineState::Loading),
            state => {
                debug!(state = state.as_str(), "Engine already initialized");
                return state;
            }
        }

        let store = Arc::clone(&self.store);
        let loaded = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(EngineError::from)
            .and_then(|outcome| outcome);

        match loaded {
            Ok(Some(bundle)) => {
                info!(version = %bundle.model_version, "Using stored model bundle");
                self.install(Arc::new(bundle));
                return EngineState::Trained;
            }
            Ok(None) => info!("No stored model bundle"),
            Err(e) => warn!(error = %e, kind = e.kind(), "Stored model bundle unusable"),
        }

        if !self.training.train_on_startup {
            info!("Training on startup disabled, entering demo mode");
            self.set_state(EngineState::DemoMode);
            return EngineState::DemoMode;
        }

        match self.train_bundle().await {
            Ok(bundle) => {
                if let Err(e) = self.persist(Arc::clone(&bundle)).await {
                    warn!(error = %e, "Failed to save trained bundle, serving it from memory");
                }
                self.install(bundle);
                EngineState::Trained
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Training failed, entering demo mode");
                self.set_state(EngineState::DemoMode);
                EngineState::DemoMode
            }
        }
    }

    async fn train_bundle(&self) -> Result<Arc<ModelBundle>> {
        let store = Arc::clone(&self.store);
        let source = Arc::clone(&self.training_source);
        let (n_samples, n_features) = (self.training.n_samples, self.training.n_features);

        info!(n_samples, n_features, source = source.name(), "Training model bundle");
        let bundle =
            tokio::task::spawn_blocking(move || store.train(source.as_ref(), n_samples, n_features))
                .await??;
        Ok(Arc::new(bundle))
    }

    async fn persist(&self, bundle: Arc<ModelBundle>) -> Result<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save(&bundle)).await??;
        Ok(())
    }

    /// Predict one game. Only a missing `initialize` is an error; anything
    /// else yields a demo result.
    #[instrument(skip(self, request), fields(game_id = %request.game_id))]
    pub async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult> {
        self.predict_with_fallback(request)
            .await
            .map(|prediction| prediction.result)
    }

    async fn predict_with_fallback(&self, request: &PredictionRequest) -> Result<Prediction> {
        self.ensure_initialized()?;

        match self.predict_inner(request).await {
            Ok(result) => Ok(Prediction {
                result,
                fallback: None,
            }),
            Err(e) if e.is_recoverable() => {
                warn!(
                    game_id = %request.game_id,
                    kind = e.kind(),
                    error = %e,
                    "Prediction failed, using demo result"
                );
                Ok(Prediction {
                    result: demo_predict(&request.game_id),
                    fallback: Some(e),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn predict_inner(&self, request: &PredictionRequest) -> Result<PredictionResult> {
        let key = cache_key(&request.game_id, request.features.as_ref())?;
        if let Some(hit) = self.cached(&key).await {
            debug!(game_id = %request.game_id, "Prediction cache hit");
            return Ok(hit);
        }

        let features = match &request.features {
            Some(features) => self.builder.build_from_features(features),
            None => self.builder.build_from_game_id(&request.game_id).await?,
        };

        let bundle = self.current_bundle();
        let kinds = if request.prediction_types.is_empty() {
            vec![PredictionKind::WinProbability]
        } else {
            request.prediction_types.clone()
        };

        let needs_score = kinds
            .iter()
            .any(|k| matches!(k, PredictionKind::WinProbability | PredictionKind::Spread));
        let score = if needs_score {
            Some(self.win_score(bundle.clone(), features).await?)
        } else {
            None
        };

        let mut predictions = BTreeMap::new();
        for kind in kinds {
            let payload = match (kind, &score) {
                (PredictionKind::WinProbability, Some(s)) => PredictionPayload::WinProbability {
                    probability: s.probability,
                    confidence: s.confidence,
                    source: s.source,
                },
                (PredictionKind::Spread, Some(s)) => PredictionPayload::Spread {
                    spread: ensemble::spread(s.probability, self.config.spread_scale),
                    confidence: s.confidence,
                    source: s.source,
                },
                (PredictionKind::TotalPoints, _) => placeholder_total(self.config.total_range),
                (kind, None) => {
                    return Err(EngineError::Inference(format!("no score for {kind:?}")));
                }
            };
            predictions.insert(kind, payload);
        }

        let explanation = request.include_explanation.then(|| match &bundle {
            Some(b) => build_explanation(&b.ranked_importance()),
            None => generic_explanation(),
        });

        let confidence = match predictions.get(&PredictionKind::WinProbability) {
            Some(payload) => payload.confidence(),
            None => self.config.default_confidence,
        };

        let result = PredictionResult {
            game_id: request.game_id.clone(),
            predictions,
            explanation,
            model_info: bundle.as_deref().map(model_info).unwrap_or_else(demo_model_info),
            confidence,
            created_at: Utc::now(),
        };

        self.store_in_cache(&key, &result).await;
        Ok(result)
    }

    async fn win_score(
        &self,
        bundle: Option<Arc<ModelBundle>>,
        features: FeatureVector,
    ) -> Result<EnsembleScore> {
        let scored = tokio::task::spawn_blocking(move || {
            ensemble::score_live(bundle.as_deref(), &features)
        })
        .await?;

        match scored {
            Err(EngineError::Untrained) => {
                debug!(source = "placeholder", "No trained bundle, using placeholder score");
                let score = ensemble::placeholder_score(&mut rand::thread_rng());
                Ok(score)
            }
            other => other,
        }
    }

    async fn cached(&self, key: &str) -> Option<PredictionResult> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(key, error = %e, "Ignoring undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn store_in_cache(&self, key: &str, result: &PredictionResult) {
        let Some(cache) = &self.cache else {
            return;
        };
        let raw = match serde_json::to_string(result) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Could not encode prediction for cache");
                return;
            }
        };
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        if let Err(e) = cache.set(key, raw, ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    /// Predict many games concurrently. Entries keep request order; a failed
    /// or panicked request becomes a demo entry carrying the reason.
    #[instrument(skip(self, request), fields(games = request.game_requests.len()))]
    pub async fn predict_batch(
        self: &Arc<Self>,
        request: BatchPredictionRequest,
    ) -> Result<BatchPredictionResponse> {
        self.ensure_initialized()?;

        let limit = request
            .max_concurrent
            .unwrap_or(self.config.max_concurrent)
            .max(1);
        let semaphore = Arc::new(Semaphore::new(limit));

        let game_ids: Vec<String> = request
            .game_requests
            .iter()
            .map(|r| r.game_id.clone())
            .collect();

        let tasks = request.game_requests.into_iter().map(|game_request| {
            let engine = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| EngineError::Inference(e.to_string()))?;
                engine.predict_with_fallback(&game_request).await
            })
        });
        let outcomes = join_all(tasks).await;

        let predictions: Vec<BatchEntry> = game_ids
            .iter()
            .zip(outcomes)
            .map(|(game_id, outcome)| {
                let failure = match outcome {
                    Ok(Ok(prediction)) => {
                        return BatchEntry {
                            result: prediction.result,
                            fallback_reason: prediction.fallback.map(|e| e.to_string()),
                        }
                    }
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => format!("prediction task failed: {e}"),
                };
                warn!(%game_id, reason = %failure, "Batch entry fell back to demo result");
                BatchEntry {
                    result: demo_predict(game_id),
                    fallback_reason: Some(failure),
                }
            })
            .collect();

        let successful_predictions = predictions
            .iter()
            .filter(|entry| entry.fallback_reason.is_none())
            .count();
        let response = BatchPredictionResponse {
            total_games: predictions.len(),
            successful_predictions,
            predictions,
            batch_id: Uuid::new_v4().to_string(),
        };

        info!(
            batch_id = %response.batch_id,
            total = response.total_games,
            successful = response.successful_predictions,
            "Batch prediction complete"
        );
        Ok(response)
    }

    /// Metrics of the live bundle, or the fixed demo snapshot
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.current_bundle()
            .and_then(|bundle| bundle.performance_metrics.clone())
            .unwrap_or_else(demo_performance_metrics)
    }

    pub fn feature_info(&self) -> FeatureInfo {
        let names = self.builder.feature_names();
        let mut descriptions = self.builder.feature_descriptions();
        for name in &names {
            descriptions
                .entry(name.clone())
                .or_insert_with(|| format!("Feature: {name}"));
        }

        FeatureInfo {
            feature_importance: self
                .current_bundle()
                .map(|bundle| bundle.ranked_importance())
                .unwrap_or_default(),
            feature_descriptions: descriptions,
            total_features: names.len(),
            feature_names: names,
        }
    }

    pub async fn health(&self) -> HealthReport {
        let state = self.state();
        let cache_status = match &self.cache {
            Some(cache) => {
                if cache.is_healthy().await {
                    "healthy"
                } else {
                    "unhealthy"
                }
            }
            None => "disabled",
        };

        let (status, error) = match state {
            EngineState::Uninitialized | EngineState::Loading => (
                HealthStatus::Unhealthy,
                Some(EngineError::NotInitialized.to_string()),
            ),
            EngineState::DemoMode => (HealthStatus::Degraded, None),
            EngineState::Trained if cache_status == "unhealthy" => (HealthStatus::Degraded, None),
            EngineState::Trained => (HealthStatus::Healthy, None),
        };

        let model_version = match (state, self.current_bundle()) {
            (_, Some(bundle)) => Some(bundle.model_version.clone()),
            (EngineState::DemoMode, None) => Some(DEMO_VERSION.to_string()),
            _ => None,
        };

        let mut services = BTreeMap::new();
        services.insert("prediction_engine".to_string(), state.as_str().to_string());
        services.insert("cache".to_string(), cache_status.to_string());
        services.insert(
            "retrain".to_string(),
            if self.is_retraining() { "running" } else { "idle" }.to_string(),
        );

        HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            model_version,
            services,
            error,
            timestamp: Utc::now(),
        }
    }

    /// Start a background retrain. The new bundle is swapped in only after
    /// it has been trained, validated and saved.
    pub fn retrain(self: &Arc<Self>) -> Result<RetrainHandle> {
        self.ensure_initialized()?;
        if self
            .retraining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::RetrainInProgress);
        }
        let guard = RetrainGuard(Arc::clone(&self.retraining));
        let cancelled = Arc::new(AtomicBool::new(false));

        let engine = Arc::clone(self);
        let flag = Arc::clone(&cancelled);
        let task = tokio::spawn(async move {
            let _guard = guard;
            engine.run_retrain(flag).await
        });
        info!("Retrain started");
        Ok(RetrainHandle { task, cancelled })
    }

    async fn run_retrain(&self, cancelled: Arc<AtomicBool>) -> Result<ModelInfo> {
        let aborted = || EngineError::Training("retrain aborted".to_string());
        let outcome = async {
            let bundle = self.train_bundle().await?;
            if cancelled.load(Ordering::SeqCst) {
                return Err(aborted());
            }

            let store = Arc::clone(&self.store);
            let staged = Arc::clone(&bundle);
            let flag = Arc::clone(&cancelled);
            tokio::task::spawn_blocking(move || store.save_unless(&staged, &flag))
                .await??
                .ok_or_else(aborted)?;
            Ok::<_, EngineError>(bundle)
        }
        .await;

        match outcome {
            Ok(bundle) => {
                let info = model_info(&bundle);
                self.install(bundle);
                info!(version = %info.version, "Retrain complete, bundle swapped");
                Ok(info)
            }
            Err(e) => {
                error!(error = %e, kind = e.kind(), "Retrain failed, keeping current bundle");
                Err(e)
            }
        }
    }
}

fn model_info(bundle: &ModelBundle) -> ModelInfo {
    ModelInfo {
        version: bundle.model_version.clone(),
        last_trained: bundle.last_trained,
        ensemble_weights: bundle.ensemble_weights.clone(),
    }
}

fn placeholder_total((low, high): (f64, f64)) -> PredictionPayload {
    let mut rng = rand::thread_rng();
    PredictionPayload::TotalPoints {
        total: rng.gen_range(low..=high),
        confidence: rng.gen_range(0.6..=0.8),
        source: ScoreSource::Placeholder,
    }
}
