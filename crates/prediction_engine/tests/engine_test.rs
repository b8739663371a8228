//! Store, engine and batch behaviour against small trained bundles

use std::path::Path;
use std::sync::Arc;

use matchday_ai_trainer::{
    ForestConfig, GbdtConfig, LogisticConfig, MockTrainingData, TrainerError, TrainingDataSource,
    TrainingSplit,
};
use matchday_prediction_engine::store::{CURRENT_FILE, METADATA_FILE, SCALER_FILE};
use matchday_prediction_engine::{
    ensemble, BatchPredictionRequest, EngineConfig, EngineError, EngineState, GameFeatures,
    HealthStatus, InMemoryCache, ModelKind, ModelStore, PredictionCache, PredictionEngine, PredictionKind,
    PredictionPayload, PredictionRequest, ScoreSource, StaticGameData, StructuredFeatureBuilder,
    DEMO_VERSION,
};

struct Unavailable;

impl TrainingDataSource for Unavailable {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn generate(&self, _: usize, _: usize) -> Result<TrainingSplit, TrainerError> {
        Err(TrainerError::Dataset("training data offline".to_string()))
    }
}

fn small_config(dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.store.model_dir = dir.to_path_buf();
    config.store.retain_bundles = 2;
    config.training.n_samples = 400;
    config.training.boosted_trees = GbdtConfig {
        num_trees: 10,
        learning_rate: 0.2,
        early_stopping_rounds: None,
        ..GbdtConfig::default()
    };
    config.training.logistic = LogisticConfig {
        max_iter: 100,
        ..LogisticConfig::default()
    };
    config.training.random_forest = ForestConfig {
        num_trees: 5,
        max_depth: 4,
        ..ForestConfig::default()
    };
    config
}

fn games(ids: &[&str]) -> Arc<StaticGameData> {
    let data = StaticGameData::new();
    for id in ids {
        data.insert(*id, GameFeatures::default());
    }
    Arc::new(data)
}

fn engine_with(
    config: &EngineConfig,
    data: Arc<StaticGameData>,
    cache: Option<Arc<dyn PredictionCache>>,
    source: Arc<dyn TrainingDataSource>,
) -> Arc<PredictionEngine> {
    let builder = Arc::new(StructuredFeatureBuilder::new(data));
    Arc::new(PredictionEngine::new(config, builder, cache, source))
}

fn store_for(config: &EngineConfig) -> ModelStore {
    let names = matchday_prediction_engine::features::FEATURES
        .iter()
        .map(|(name, _)| name.to_string())
        .collect();
    ModelStore::new(config.store.clone(), config.training.clone(), names)
}

fn current_bundle_dir(dir: &Path) -> std::path::PathBuf {
    let id = std::fs::read_to_string(dir.join(CURRENT_FILE)).unwrap();
    dir.join("bundles").join(id.trim())
}

#[test]
fn test_save_then_load_preserves_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let store = store_for(&config);

    let bundle = store.train(&MockTrainingData::new(3), 400, 25).unwrap();
    assert!(bundle.performance_metrics.is_some());
    store.save(&bundle).unwrap();

    let loaded = store.load().unwrap().expect("bundle present");
    assert_eq!(loaded.feature_names, bundle.feature_names);
    assert_eq!(loaded.ensemble_weights, bundle.ensemble_weights);
    assert_eq!(loaded.model_version, bundle.model_version);

    let probe: Vec<f64> = (0..25).map(|i| (i as f64 - 12.0) / 6.0).collect();
    let before = ensemble::score(&bundle, &probe).unwrap();
    let after = ensemble::score(&loaded, &probe).unwrap();
    assert_eq!(before.probability, after.probability);
    assert_eq!(before.confidence, after.confidence);
    assert_eq!(before.components, after.components);
}

#[test]
fn test_load_rejects_weights_not_summing_to_one() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let store = store_for(&config);
    let bundle = store.train(&MockTrainingData::new(5), 400, 25).unwrap();
    store.save(&bundle).unwrap();

    let metadata_path = current_bundle_dir(dir.path()).join(METADATA_FILE);
    let mut metadata: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&metadata_path).unwrap()).unwrap();
    metadata["ensemble_weights"]["random_forest"] = serde_json::json!(0.3);
    std::fs::write(&metadata_path, serde_json::to_string(&metadata).unwrap()).unwrap();

    assert!(matches!(store.load(), Err(EngineError::CorruptBundle(_))));
}

#[test]
fn test_load_detects_tampered_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let store = store_for(&config);
    let bundle = store.train(&MockTrainingData::new(5), 400, 25).unwrap();
    store.save(&bundle).unwrap();

    let artifact = current_bundle_dir(dir.path()).join(ModelKind::Logistic.artifact_name());
    let mut bytes = std::fs::read(&artifact).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&artifact, bytes).unwrap();

    assert!(matches!(store.load(), Err(EngineError::CorruptBundle(_))));
}

#[test]
fn test_partial_bundle_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let store = store_for(&config);
    let bundle = store.train(&MockTrainingData::new(5), 400, 25).unwrap();
    store.save(&bundle).unwrap();

    std::fs::remove_file(current_bundle_dir(dir.path()).join(SCALER_FILE)).unwrap();
    assert!(store.load().unwrap().is_none());
}

#[test]
fn test_old_bundles_are_pruned() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let store = store_for(&config);
    let bundle = store.train(&MockTrainingData::new(5), 400, 25).unwrap();

    for _ in 0..4 {
        store.save(&bundle).unwrap();
    }
    let kept = std::fs::read_dir(dir.path().join("bundles")).unwrap().count();
    assert_eq!(kept, config.store.retain_bundles);
    assert!(store.load().unwrap().is_some());
}

#[tokio::test]
async fn test_unreachable_builder_without_bundle_gives_demo_result() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.training.train_on_startup = false;

    let engine = engine_with(&config, games(&[]), None, Arc::new(Unavailable));
    assert_eq!(engine.initialize().await, EngineState::DemoMode);

    let result = engine.predict(&PredictionRequest::new("g1")).await.unwrap();
    assert!(result.is_demo());
    assert_eq!(result.model_info.version, DEMO_VERSION);
    assert!(result.model_info.ensemble_weights.is_empty());
}

#[tokio::test]
async fn test_batch_isolates_failed_request() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.training.train_on_startup = false;

    let data = games(&["g1", "g2", "g4", "g5"]);
    let engine = engine_with(&config, data, None, Arc::new(Unavailable));
    engine.initialize().await;

    let request = BatchPredictionRequest {
        game_requests: ["g1", "g2", "g3", "g4", "g5"]
            .into_iter()
            .map(PredictionRequest::new)
            .collect(),
        max_concurrent: Some(2),
    };
    let response = engine.predict_batch(request).await.unwrap();

    assert_eq!(response.total_games, 5);
    assert_eq!(response.predictions.len(), 5);
    assert_eq!(response.successful_predictions, 4);
    assert!(!response.batch_id.is_empty());

    let order: Vec<&str> = response
        .predictions
        .iter()
        .map(|entry| entry.result.game_id.as_str())
        .collect();
    assert_eq!(order, vec!["g1", "g2", "g3", "g4", "g5"]);
    assert!(response.predictions[2].fallback_reason.is_some());
    assert!(response.predictions[0].fallback_reason.is_none());
}

#[tokio::test]
async fn test_trained_engine_scores_with_models() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let engine = engine_with(
        &config,
        games(&[]),
        None,
        Arc::new(MockTrainingData::new(config.training.seed)),
    );
    assert_eq!(engine.initialize().await, EngineState::Trained);
    assert!(dir.path().join(CURRENT_FILE).is_file());

    let mut request = PredictionRequest::new("g7");
    request.features = Some(GameFeatures::default());
    request.prediction_types = vec![
        PredictionKind::WinProbability,
        PredictionKind::Spread,
        PredictionKind::TotalPoints,
    ];
    let result = engine.predict(&request).await.unwrap();

    assert!(!result.is_demo());
    assert_eq!(result.model_info.ensemble_weights.len(), 3);

    let p = result.win_probability().unwrap();
    assert!((0.0..=1.0).contains(&p));
    assert!((0.5..=1.0).contains(&result.confidence));
    match result.predictions.get(&PredictionKind::Spread) {
        Some(PredictionPayload::Spread { spread, source, .. }) => {
            assert_eq!(*spread, (p - 0.5) * config.prediction.spread_scale);
            assert_eq!(*source, ScoreSource::Model);
        }
        other => panic!("unexpected spread payload: {other:?}"),
    }
    assert_eq!(
        result.predictions[&PredictionKind::TotalPoints].source(),
        ScoreSource::Placeholder
    );

    let explanation = result.explanation.expect("explanation requested");
    assert!(explanation.main_factors.len() <= 3);

    let metrics = engine.performance_metrics();
    assert_ne!(metrics.model_version, DEMO_VERSION);
    assert_eq!(metrics.training_samples, 320);
}

#[tokio::test]
async fn test_restart_loads_stored_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());

    let first = engine_with(&config, games(&[]), None, Arc::new(MockTrainingData::new(1)));
    assert_eq!(first.initialize().await, EngineState::Trained);
    let version = first.current_bundle().unwrap().model_version.clone();

    let second = engine_with(&config, games(&[]), None, Arc::new(Unavailable));
    assert_eq!(second.initialize().await, EngineState::Trained);
    assert_eq!(second.current_bundle().unwrap().model_version, version);
}

#[tokio::test]
async fn test_second_prediction_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.training.train_on_startup = false;

    let cache = Arc::new(InMemoryCache::new());
    let engine = engine_with(
        &config,
        games(&["g1"]),
        Some(cache.clone()),
        Arc::new(Unavailable),
    );
    engine.initialize().await;

    let request = PredictionRequest::new("g1");
    let first = engine.predict(&request).await.unwrap();
    let second = engine.predict(&request).await.unwrap();
    assert_eq!(first.created_at, second.created_at);

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.prediction_cache_size, 1);
}

#[tokio::test]
async fn test_retrain_swaps_bundle_and_rejects_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.training.train_on_startup = false;

    let engine = engine_with(&config, games(&[]), None, Arc::new(MockTrainingData::new(9)));
    assert_eq!(engine.initialize().await, EngineState::DemoMode);

    let handle = engine.retrain().unwrap();
    assert!(matches!(engine.retrain(), Err(EngineError::RetrainInProgress)));

    let info = handle.wait().await.unwrap();
    assert_eq!(engine.state(), EngineState::Trained);
    assert_eq!(engine.current_bundle().unwrap().model_version, info.version);
    assert!(!engine.is_retraining());
}

#[tokio::test]
async fn test_failed_retrain_keeps_current_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());

    let first = engine_with(&config, games(&[]), None, Arc::new(MockTrainingData::new(2)));
    first.initialize().await;
    let version = first.current_bundle().unwrap().model_version.clone();

    let engine = engine_with(&config, games(&[]), None, Arc::new(Unavailable));
    engine.initialize().await;

    let outcome = engine.retrain().unwrap().wait().await;
    assert!(matches!(outcome, Err(EngineError::Training(_))));
    assert_eq!(engine.current_bundle().unwrap().model_version, version);
    assert!(!engine.is_retraining());
}

#[tokio::test]
async fn test_extreme_win_counts_still_predict() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.training.train_on_startup = false;

    let engine = engine_with(&config, games(&[]), None, Arc::new(Unavailable));
    engine.initialize().await;

    let mut request = PredictionRequest::new("g1");
    request.features = Some(GameFeatures {
        home_team_wins: u32::MAX,
        home_team_losses: 1,
        ..GameFeatures::default()
    });
    let result = engine.predict(&request).await.unwrap();
    assert_eq!(result.game_id, "g1");
    assert!(result.win_probability().is_some());
}

#[tokio::test]
async fn test_full_cache_does_not_fail_prediction() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.training.train_on_startup = false;

    let cache = Arc::new(InMemoryCache::with_capacity(1));
    let engine = engine_with(
        &config,
        games(&["g1", "g2"]),
        Some(cache.clone()),
        Arc::new(Unavailable),
    );
    engine.initialize().await;

    engine.predict(&PredictionRequest::new("g1")).await.unwrap();
    let second = engine.predict(&PredictionRequest::new("g2")).await.unwrap();
    assert_eq!(second.game_id, "g2");
    assert!(second.win_probability().is_some());

    // g2 was scored but its cache write was refused
    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.prediction_cache_size, 1);
    assert!(!cache.is_healthy().await);
    assert_eq!(engine.health().await.status, HealthStatus::Degraded);

    let again = engine.predict(&PredictionRequest::new("g2")).await.unwrap();
    assert_ne!(again.created_at, second.created_at);
}

#[tokio::test]
async fn test_aborted_retrain_leaves_store_and_bundle_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());

    let engine = engine_with(&config, games(&[]), None, Arc::new(MockTrainingData::new(4)));
    assert_eq!(engine.initialize().await, EngineState::Trained);
    let version = engine.current_bundle().unwrap().model_version.clone();
    let current = store_for(&config).current_bundle_id().unwrap();

    let handle = engine.retrain().unwrap();
    handle.abort();
    assert!(engine.is_retraining());

    let outcome = handle.wait().await;
    assert!(matches!(outcome, Err(EngineError::Training(ref msg)) if msg == "retrain aborted"));
    assert_eq!(engine.current_bundle().unwrap().model_version, version);
    assert_eq!(store_for(&config).current_bundle_id().unwrap(), current);
    assert!(!engine.is_retraining());

    let info = engine.retrain().unwrap().wait().await.unwrap();
    assert_ne!(info.version, version);
}

#[test]
fn test_cancelled_save_keeps_previous_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let store = store_for(&config);

    let bundle = store
        .train(&MockTrainingData::new(5), config.training.n_samples, config.training.n_features)
        .unwrap();
    store.save(&bundle).unwrap();
    let current = store.current_bundle_id().unwrap();

    let cancelled = std::sync::atomic::AtomicBool::new(true);
    assert!(store.save_unless(&bundle, &cancelled).unwrap().is_none());
    assert_eq!(store.current_bundle_id().unwrap(), current);
    assert_eq!(std::fs::read_dir(dir.path().join("bundles")).unwrap().count(), 1);
}

#[test]
fn test_same_second_trainings_get_distinct_versions() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let store = store_for(&config);
    let source = MockTrainingData::new(6);

    let a = store.train(&source, config.training.n_samples, config.training.n_features).unwrap();
    let b = store.train(&source, config.training.n_samples, config.training.n_features).unwrap();
    assert_ne!(a.model_version, b.model_version);
}
