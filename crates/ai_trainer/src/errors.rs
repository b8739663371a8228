use thiserror::Error;

/// Errors returned by the trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("training error: {0}")]
    Training(String),

    #[error("model error: {0}")]
    Model(#[from] matchday_ai_core::ModelError),
}
