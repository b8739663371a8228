//! Training data sources
//!
//! A [`TrainingDataSource`] hands the fitting code a train/validation split.
//! [`MockTrainingData`] synthesises a reproducible labelled set and
//! [`CsvTrainingData`] reads historical games from disk.

use matchday_ai_core::sigmoid;
use rand::Rng;
use std::path::PathBuf;

use crate::dataset::{Dataset, TrainingSplit};
use crate::deterministic::seeded_rng;
use crate::errors::TrainerError;

/// Produces labelled feature matrices for training
pub trait TrainingDataSource: Send + Sync {
    /// Short identifier recorded in model metadata
    fn name(&self) -> &str;

    /// Return up to `n_samples` rows of width `n_features`, split for validation
    fn generate(&self, n_samples: usize, n_features: usize) -> Result<TrainingSplit, TrainerError>;
}

/// Synthetic games drawn from a fixed logistic ground truth with one
/// interaction term, so tree models have something linear models miss
#[derive(Clone, Debug)]
pub struct MockTrainingData {
    pub seed: u64,
    pub validation_fraction: f64,
}

impl MockTrainingData {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            validation_fraction: 0.2,
        }
    }
}

impl Default for MockTrainingData {
    fn default() -> Self {
        Self::new(42)
    }
}

impl TrainingDataSource for MockTrainingData {
    fn name(&self) -> &str {
        "mock"
    }

    fn generate(&self, n_samples: usize, n_features: usize) -> Result<TrainingSplit, TrainerError> {
        if n_samples < 2 || n_features == 0 {
            return Err(TrainerError::Dataset(format!(
                "cannot generate {n_samples} samples with {n_features} features"
            )));
        }

        let mut rng = seeded_rng(self.seed, 0);
        let informative = n_features.min(10);
        let truth: Vec<f64> = (0..n_features)
            .map(|j| if j < informative { 0.8 * standard_normal(&mut rng) } else { 0.0 })
            .collect();

        let mut features = Vec::with_capacity(n_samples);
        let mut labels = Vec::with_capacity(n_samples);
        for _ in 0..n_samples {
            let row: Vec<f64> = (0..n_features).map(|_| standard_normal(&mut rng)).collect();
            let mut logit: f64 = row.iter().zip(&truth).map(|(x, w)| x * w).sum();
            if n_features >= 2 {
                logit += 0.5 * row[0] * row[1];
            }
            labels.push(if rng.gen::<f64>() < sigmoid(logit) { 1.0 } else { 0.0 });
            features.push(row);
        }

        let dataset =
            Dataset::new(features, labels).map_err(|e| TrainerError::Dataset(e.to_string()))?;
        dataset
            .split(self.validation_fraction)
            .map_err(|e| TrainerError::Dataset(e.to_string()))
    }
}

/// Historical games loaded from a CSV file (features then a 0/1 label)
#[derive(Clone, Debug)]
pub struct CsvTrainingData {
    pub path: PathBuf,
    pub seed: u64,
    pub validation_fraction: f64,
}

impl CsvTrainingData {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seed: 42,
            validation_fraction: 0.2,
        }
    }
}

impl TrainingDataSource for CsvTrainingData {
    fn name(&self) -> &str {
        "csv"
    }

    fn generate(&self, n_samples: usize, n_features: usize) -> Result<TrainingSplit, TrainerError> {
        let mut dataset = Dataset::from_csv(&self.path)
            .map_err(|e| TrainerError::Dataset(format!("{}: {e:#}", self.path.display())))?;

        if dataset.feature_count != n_features {
            return Err(TrainerError::Dataset(format!(
                "{} has {} feature columns, expected {}",
                self.path.display(),
                dataset.feature_count,
                n_features
            )));
        }

        dataset.shuffle(self.seed);
        if n_samples < dataset.len() {
            dataset.truncate(n_samples);
        }
        tracing::info!(rows = dataset.len(), path = %self.path.display(), "Loaded training CSV");

        dataset
            .split(self.validation_fraction)
            .map_err(|e| TrainerError::Dataset(e.to_string()))
    }
}

/// Box-Muller transform
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
