//! Gradient Boosted Decision Tree (GBDT) trainer
//!
//! Fits a binary classifier under logistic loss with second-order CART
//! trees, row bagging, per-tree feature sampling and early stopping on the
//! validation log-loss.

use matchday_ai_core::gbdt::{BoostedTreesModel, Tree};
use matchday_ai_core::{metrics, sigmoid};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::cart::{CartBuilder, TreeConfig};
use crate::dataset::TrainingSplit;
use crate::deterministic::seeded_rng;
use crate::errors::TrainerError;

/// GBDT training configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbdtConfig {
    pub num_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub min_child_weight: f64,
    pub learning_rate: f64,
    pub lambda: f64,
    /// Fraction of rows drawn (without replacement) for each bag
    pub bagging_fraction: f64,
    /// Redraw the bag every this many rounds; 0 disables bagging
    pub bagging_freq: usize,
    /// Fraction of features each tree may split on
    pub feature_fraction: f64,
    /// Stop after this many rounds without validation improvement
    pub early_stopping_rounds: Option<usize>,
    pub seed: u64,
}

impl Default for GbdtConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            max_depth: 5,
            min_samples_leaf: 20,
            min_child_weight: 1e-3,
            learning_rate: 0.05,
            lambda: 1.0,
            bagging_fraction: 0.8,
            bagging_freq: 5,
            feature_fraction: 0.9,
            early_stopping_rounds: Some(50),
            seed: 42,
        }
    }
}

/// GBDT trainer
pub struct GbdtTrainer {
    config: GbdtConfig,
}

impl GbdtTrainer {
    pub fn new(config: GbdtConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GbdtConfig {
        &self.config
    }

    /// Train a boosted-trees model on the training side of `split`, using
    /// the validation side for early stopping
    pub fn train(&self, split: &TrainingSplit) -> Result<BoostedTreesModel, TrainerError> {
        let train = &split.train;
        let validation = &split.validation;
        let feature_count = train.feature_count;

        if train.is_empty() || feature_count == 0 {
            return Err(TrainerError::Training(
                "boosted trees need a non-empty training set".to_string(),
            ));
        }
        if !(self.config.learning_rate > 0.0) {
            return Err(TrainerError::Training(format!(
                "learning rate must be positive, got {}",
                self.config.learning_rate
            )));
        }

        let base_score = self.calculate_base_score(&train.labels);
        let mut train_raw = vec![base_score; train.len()];
        let mut val_raw = vec![base_score; validation.len()];

        let all_rows: Vec<usize> = (0..train.len()).collect();
        let all_features: Vec<usize> = (0..feature_count).collect();
        let bag_size = ((train.len() as f64 * self.config.bagging_fraction).ceil() as usize)
            .clamp(1, train.len());
        let feature_sample = ((feature_count as f64 * self.config.feature_fraction).ceil() as usize)
            .clamp(1, feature_count);

        let tree_config = TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            min_samples_split: 2 * self.config.min_samples_leaf.max(1),
            min_child_weight: self.config.min_child_weight,
            lambda: self.config.lambda,
            max_features: None,
        };

        let mut trees: Vec<Tree> = Vec::with_capacity(self.config.num_trees);
        let mut gains: Vec<Vec<f64>> = Vec::with_capacity(self.config.num_trees);
        let mut rows = all_rows.clone();
        let mut best_iteration = 0usize;
        let mut best_loss = f64::INFINITY;

        for round in 0..self.config.num_trees {
            let mut rng = seeded_rng(self.config.seed, round as u64);

            let bagging = self.config.bagging_freq > 0 && bag_size < train.len();
            if bagging && round % self.config.bagging_freq == 0 {
                rows = all_rows.clone();
                rows.shuffle(&mut rng);
                rows.truncate(bag_size);
                rows.sort_unstable();
            }

            let mut features: Vec<usize> = all_features
                .choose_multiple(&mut rng, feature_sample)
                .copied()
                .collect();
            features.sort_unstable();

            let (gradients, hessians) = self.calculate_gradients_hessians(&train.labels, &train_raw);
            let builder = CartBuilder::new(&train.features, &gradients, &hessians, tree_config.clone());
            let built = builder.build(&rows, &features, &mut rng);

            let mut tree = built.tree;
            tree.weight = self.config.learning_rate;

            update_raw(&tree, &train.features, &mut train_raw);
            update_raw(&tree, &validation.features, &mut val_raw);
            trees.push(tree);
            gains.push(built.split_gains);

            if validation.is_empty() {
                best_iteration = round;
                continue;
            }

            let probs: Vec<f64> = val_raw.iter().map(|&r| sigmoid(r)).collect();
            let loss = metrics::log_loss(&validation.labels, &probs);
            tracing::debug!(round, validation_log_loss = loss, "boosting round");

            if loss < best_loss {
                best_loss = loss;
                best_iteration = round;
            } else if let Some(patience) = self.config.early_stopping_rounds {
                if round - best_iteration >= patience {
                    tracing::info!(
                        best_iteration,
                        best_loss,
                        "Early stopping boosted trees"
                    );
                    break;
                }
            }
        }

        trees.truncate(best_iteration + 1);
        gains.truncate(best_iteration + 1);
        let feature_importances = normalise_gains(feature_count, &gains);

        tracing::info!(
            trees = trees.len(),
            base_score,
            "Trained boosted trees"
        );

        let model = BoostedTreesModel::new(feature_count, base_score, trees, feature_importances);
        model.validate()?;
        Ok(model)
    }

    /// Log-odds of the positive rate
    fn calculate_base_score(&self, labels: &[f64]) -> f64 {
        let mean = labels.iter().sum::<f64>() / labels.len().max(1) as f64;
        let p = mean.clamp(1e-6, 1.0 - 1e-6);
        (p / (1.0 - p)).ln()
    }

    /// Logistic loss: g = p - y, h = p(1 - p)
    fn calculate_gradients_hessians(&self, labels: &[f64], raw: &[f64]) -> (Vec<f64>, Vec<f64>) {
        labels
            .iter()
            .zip(raw)
            .map(|(&y, &r)| {
                let p = sigmoid(r);
                (p - y, (p * (1.0 - p)).max(1e-16))
            })
            .unzip()
    }
}

fn update_raw(tree: &Tree, features: &[Vec<f64>], raw: &mut [f64]) {
    for (value, row) in raw.iter_mut().zip(features) {
        *value += tree.weight * tree.evaluate(row);
    }
}

/// Sum per-feature split gains across trees and scale to unit total
fn normalise_gains(feature_count: usize, gains: &[Vec<f64>]) -> Vec<f64> {
    let mut totals = vec![0.0; feature_count];
    for tree_gains in gains {
        for (total, gain) in totals.iter_mut().zip(tree_gains) {
            *total += gain;
        }
    }
    let sum: f64 = totals.iter().sum();
    if sum > 0.0 {
        totals.iter_mut().for_each(|t| *t /= sum);
    }
    totals
}
