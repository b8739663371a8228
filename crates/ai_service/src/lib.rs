//! Matchday prediction service
//!
//! HTTP surface over the prediction engine:
//! - `GET /health`
//! - `POST /predict`, `POST /predict/batch`
//! - `GET /model/performance`, `POST /model/retrain`, `GET /model/features`
//! - `GET /cache/stats`, `DELETE /cache/clear`
//! - `GET /metrics` (Prometheus text)

pub mod context;
pub mod errors;
pub mod metrics;
pub mod routes;

pub use context::AppContext;
pub use errors::ServiceError;
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use routes::routes;

/// Service version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
