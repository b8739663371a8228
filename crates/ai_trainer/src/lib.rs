//! Matchday trainer - fitting for the three-model ensemble
//!
//! Provides tools for fitting gradient-boosted trees, a Platt-calibrated
//! logistic regression and a random forest on labelled game data, plus the
//! data sources that produce train/validation splits.

pub mod cart;
pub mod dataset;
pub mod deterministic;
pub mod ensemble;
pub mod errors;
pub mod forest;
pub mod logistic;
pub mod source;
pub mod trainer;

pub use dataset::{Dataset, TrainingSplit};
pub use deterministic::seeded_rng;
pub use ensemble::{EnsembleTrainer, FittedEnsemble};
pub use errors::TrainerError;
pub use forest::{ForestConfig, ForestTrainer};
pub use logistic::{LogisticConfig, LogisticTrainer};
pub use source::{CsvTrainingData, MockTrainingData, TrainingDataSource};
pub use trainer::{GbdtConfig, GbdtTrainer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
