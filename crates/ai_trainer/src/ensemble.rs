//! Fits all three ensemble members on one train/validation split

use matchday_ai_core::{BoostedTreesModel, CalibratedLogistic, RandomForestModel, StandardScaler};

use crate::dataset::{Dataset, TrainingSplit};
use crate::errors::TrainerError;
use crate::forest::{ForestConfig, ForestTrainer};
use crate::logistic::{LogisticConfig, LogisticTrainer};
use crate::trainer::{GbdtConfig, GbdtTrainer};

/// The fitted members plus the scaler used by logistic regression
#[derive(Debug, Clone)]
pub struct FittedEnsemble {
    pub boosted: BoostedTreesModel,
    pub logistic: CalibratedLogistic,
    pub forest: RandomForestModel,
    pub scaler: StandardScaler,
}

#[derive(Clone, Debug, Default)]
pub struct EnsembleTrainer {
    pub gbdt: GbdtConfig,
    pub logistic: LogisticConfig,
    pub forest: ForestConfig,
}

impl EnsembleTrainer {
    pub fn new(gbdt: GbdtConfig, logistic: LogisticConfig, forest: ForestConfig) -> Self {
        Self {
            gbdt,
            logistic,
            forest,
        }
    }

    /// Fit the scaler on the training rows only, then the three models.
    /// Tree models see raw features; logistic regression sees scaled ones.
    pub fn fit(&self, split: &TrainingSplit) -> Result<FittedEnsemble, TrainerError> {
        if split.train.is_empty() {
            return Err(TrainerError::Dataset("training split is empty".to_string()));
        }
        if split.validation.feature_count != split.train.feature_count && !split.validation.is_empty() {
            return Err(TrainerError::Dataset(format!(
                "train has {} features but validation has {}",
                split.train.feature_count, split.validation.feature_count
            )));
        }

        tracing::info!(
            train_rows = split.train.len(),
            validation_rows = split.validation.len(),
            features = split.train.feature_count,
            "Fitting ensemble"
        );

        let scaler = StandardScaler::fit(&split.train.features)?;
        let scaled = Dataset {
            features: scaler.transform_rows(&split.train.features)?,
            labels: split.train.labels.clone(),
            feature_count: split.train.feature_count,
        };

        let (boosted, forest) = rayon::join(
            || GbdtTrainer::new(self.gbdt.clone()).train(split),
            || ForestTrainer::new(self.forest.clone()).train(&split.train),
        );
        let logistic = LogisticTrainer::new(self.logistic.clone()).train(&scaled)?;

        Ok(FittedEnsemble {
            boosted: boosted?,
            logistic,
            forest: forest?,
            scaler,
        })
    }
}
