//! Application context shared by every handler

use matchday_prediction_engine::features::GameDataSource;
use matchday_prediction_engine::{
    training_source, EngineConfig, InMemoryCache, PredictionCache, PredictionEngine,
    StaticGameData, StructuredFeatureBuilder,
};
use std::sync::Arc;
use tracing::info;

use crate::errors::ServiceError;
use crate::metrics::MetricsCollector;

/// Built once at startup and cloned into each route
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<PredictionEngine>,
    pub cache: Arc<dyn PredictionCache>,
    pub config: Arc<EngineConfig>,
    pub metrics: Arc<MetricsCollector>,
}

impl AppContext {
    /// Wire the engine from `config`: in-memory cache, structured features
    /// over the configured game table, and the configured training data
    pub fn from_config(config: EngineConfig) -> Result<Self, ServiceError> {
        let games = match &config.service.games_file {
            Some(path) => StaticGameData::from_json_file(path)?,
            None => StaticGameData::new(),
        };
        Ok(Self::with_game_data(config, Arc::new(games)))
    }

    pub fn with_game_data(config: EngineConfig, games: Arc<dyn GameDataSource>) -> Self {
        let cache: Arc<dyn PredictionCache> = Arc::new(InMemoryCache::with_capacity(config.prediction.cache_max_entries));
        let builder = Arc::new(StructuredFeatureBuilder::new(games));
        let engine = PredictionEngine::new(
            &config,
            builder,
            Some(Arc::clone(&cache)),
            training_source(&config.training),
        );

        info!(
            model_dir = %config.store.model_dir.display(),
            "Application context ready"
        );
        Self {
            engine: Arc::new(engine),
            cache,
            config: Arc::new(config),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }
}
