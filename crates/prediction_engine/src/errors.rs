//! Prediction engine error types

use thiserror::Error;

/// Errors raised by the engine, its store and its collaborators
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Prediction engine not initialized")]
    NotInitialized,

    #[error("Corrupt model bundle: {0}")]
    CorruptBundle(String),

    #[error("Features unavailable for game {game_id}: {reason}")]
    FeatureUnavailable { game_id: String, reason: String },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Feature width mismatch: expected {expected}, got {actual}")]
    FeatureWidthMismatch { expected: usize, actual: usize },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("No trained model bundle")]
    Untrained,

    #[error("Training failed: {0}")]
    Training(String),

    #[error("A retrain is already running")]
    RetrainInProgress,

    #[error("Model store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether `predict` recovers from this error with a demo result.
    /// Only a missing engine escalates to the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::NotInitialized)
    }

    /// Short machine-readable kind for logs and batch entries
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotInitialized => "not_initialized",
            EngineError::CorruptBundle(_) => "corrupt_bundle",
            EngineError::FeatureUnavailable { .. } => "feature_unavailable",
            EngineError::Inference(_) => "inference",
            EngineError::FeatureWidthMismatch { .. } => "feature_width_mismatch",
            EngineError::CacheUnavailable(_) => "cache_unavailable",
            EngineError::Untrained => "untrained",
            EngineError::Training(_) => "training",
            EngineError::RetrainInProgress => "retrain_in_progress",
            EngineError::Store(_) => "store",
            EngineError::Config(_) => "config",
            EngineError::Io(_) => "io",
            EngineError::Serialization(_) => "serialization",
        }
    }
}

impl From<matchday_ai_core::ModelError> for EngineError {
    fn from(err: matchday_ai_core::ModelError) -> Self {
        match err {
            matchday_ai_core::ModelError::FeatureCountMismatch { expected, actual } => {
                EngineError::FeatureWidthMismatch { expected, actual }
            }
            other => EngineError::Inference(other.to_string()),
        }
    }
}

impl From<matchday_ai_trainer::TrainerError> for EngineError {
    fn from(err: matchday_ai_trainer::TrainerError) -> Self {
        EngineError::Training(err.to_string())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::Inference(format!("worker task failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
