//! Service error types and their HTTP mapping

use matchday_prediction_engine::EngineError;
use thiserror::Error;
use warp::http::StatusCode;

/// Errors surfaced by the HTTP handlers
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Engine(EngineError::NotInitialized) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Engine(EngineError::RetrainInProgress) => StatusCode::CONFLICT,
            ServiceError::Engine(EngineError::FeatureUnavailable { .. }) => StatusCode::NOT_FOUND,
            ServiceError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Short identifier for the JSON error body
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Engine(e) => e.kind(),
            ServiceError::BadRequest(_) => "bad_request",
        }
    }
}

impl warp::reject::Reject for ServiceError {}
