//! Classifier models for sports-outcome prediction
//!
//! Provides the fitted model types consumed by the prediction engine and
//! their inference paths. Fitting lives in `matchday-ai-trainer`.
//!
//! Modules:
//! - `gbdt`: regression trees and the boosted-trees classifier
//! - `logistic`: logistic regression with a Platt calibrator
//! - `forest`: random-forest classifier
//! - `scaler`: standard (z-score) feature scaler
//! - `metrics`: accuracy, log-loss, AUC-ROC and Brier score
//! - `classifier`: the `Classifier` trait shared by all three models
//! - `serialization`: artifact encoding, canonical JSON and digests

pub mod classifier;
pub mod errors;
pub mod forest;
pub mod gbdt;
pub mod logistic;
pub mod metrics;
pub mod scaler;
pub mod serialization;

pub use classifier::{sigmoid, Classifier};
pub use errors::{ModelError, Result};
pub use forest::RandomForestModel;
pub use gbdt::{BoostedTreesModel, Node, Tree};
pub use logistic::{CalibratedLogistic, LogisticModel, PlattCalibrator};
pub use scaler::StandardScaler;

/// Crate version string for metadata and validation reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
