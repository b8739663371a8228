//! Matchday prediction engine
//!
//! Loads or trains the three-model ensemble, keeps the live bundle behind an
//! `Arc` swap and answers win-probability, spread and total-points requests
//! with a demo fallback whenever a step fails.
//!
//! Modules:
//! - `store`: versioned on-disk model bundles and training
//! - `ensemble`: weighted combination and agreement-based confidence
//! - `engine`: the prediction orchestrator and its lifecycle
//! - `fallback`: demo-mode results
//! - `features`: feature builder trait and the structured builder
//! - `cache`: prediction cache trait and the in-memory TTL cache
//! - `explain`: explanation text from feature importance

pub mod cache;
pub mod config;
pub mod engine;
pub mod ensemble;
pub mod errors;
pub mod explain;
pub mod fallback;
pub mod features;
pub mod store;
pub mod types;

pub use cache::{cache_key, InMemoryCache, PredictionCache};
pub use config::{EngineConfig, PredictionConfig, ServiceConfig, StoreConfig, TrainingConfig};
pub use engine::{training_source, EngineState, PredictionEngine, RetrainHandle};
pub use ensemble::EnsembleScore;
pub use errors::{EngineError, Result};
pub use fallback::{demo_predict, DEMO_VERSION};
pub use features::{
    FeatureBuilder, FeatureVector, GameDataSource, StaticGameData, StructuredFeatureBuilder,
};
pub use store::{ModelBundle, ModelStore};
pub use types::*;

/// Crate version reported by health checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
