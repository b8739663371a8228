//! Error types for the model crate

use thiserror::Error;

/// Errors raised while validating, encoding or evaluating a model
#[derive(Error, Debug)]
pub enum ModelError {
    /// Input width does not match the width the model was fitted on
    #[error("Feature count mismatch: model expects {expected}, got {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },

    /// Model structure is inconsistent
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    /// Input contains values the model cannot evaluate
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary encoding error
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;
