//! Random forest trainer
//!
//! Trees are grown independently on bootstrap samples with per-split feature
//! sampling. Each tree reuses the CART builder with `g = -w·y`, `h = w` and
//! no regularisation, so every leaf holds the weighted positive fraction of
//! the rows that reach it.

use matchday_ai_core::RandomForestModel;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cart::{CartBuilder, TreeConfig};
use crate::dataset::Dataset;
use crate::deterministic::seeded_rng;
use crate::errors::TrainerError;

/// Offset keeping forest RNG streams apart from the boosting rounds
const STREAM_OFFSET: u64 = 1 << 32;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub num_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` uses `sqrt(feature_count)`
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub balanced: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            max_depth: 10,
            min_samples_split: 10,
            min_samples_leaf: 5,
            max_features: None,
            bootstrap: true,
            balanced: true,
            seed: 42,
        }
    }
}

pub struct ForestTrainer {
    config: ForestConfig,
}

impl ForestTrainer {
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }

    pub fn train(&self, data: &Dataset) -> Result<RandomForestModel, TrainerError> {
        if data.is_empty() || data.feature_count == 0 {
            return Err(TrainerError::Training(
                "random forest needs a non-empty training set".to_string(),
            ));
        }
        if self.config.num_trees == 0 {
            return Err(TrainerError::Training(
                "random forest needs at least one tree".to_string(),
            ));
        }

        let weights = if self.config.balanced {
            data.balanced_weights()
        } else {
            vec![1.0; data.len()]
        };
        let gradients: Vec<f64> = weights
            .iter()
            .zip(&data.labels)
            .map(|(w, y)| -w * y)
            .collect();

        let max_features = self
            .config
            .max_features
            .unwrap_or_else(|| (data.feature_count as f64).sqrt().round() as usize)
            .clamp(1, data.feature_count);

        let tree_config = TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            min_samples_split: self.config.min_samples_split,
            min_child_weight: 0.0,
            lambda: 0.0,
            max_features: Some(max_features),
        };
        let builder = CartBuilder::new(&data.features, &gradients, &weights, tree_config);
        let all_features: Vec<usize> = (0..data.feature_count).collect();
        let n = data.len();

        let trees = (0..self.config.num_trees)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = seeded_rng(self.config.seed, STREAM_OFFSET + tree_idx as u64);
                let mut rows: Vec<usize> = if self.config.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                rows.sort_unstable();
                let mut tree = builder.build(&rows, &all_features, &mut rng).tree;
                for leaf in tree.nodes.iter_mut().filter_map(|node| node.leaf.as_mut()) {
                    *leaf = leaf.clamp(0.0, 1.0);
                }
                tree
            })
            .collect::<Vec<_>>();

        tracing::info!(
            trees = trees.len(),
            max_features,
            "Trained random forest"
        );

        let model = RandomForestModel::new(data.feature_count, trees);
        model.validate()?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchday_ai_core::Classifier;

    fn blobs() -> Dataset {
        let rows: Vec<Vec<f64>> = (0..120)
            .map(|i| {
                let side = if i % 2 == 0 { 1.0 } else { -1.0 };
                vec![side * (1.0 + (i % 7) as f64 / 10.0), (i % 5) as f64]
            })
            .collect();
        let labels = rows.iter().map(|r| if r[0] > 0.0 { 1.0 } else { 0.0 }).collect();
        Dataset::new(rows, labels).unwrap()
    }

    fn small_config() -> ForestConfig {
        ForestConfig {
            num_trees: 15,
            max_depth: 4,
            max_features: Some(2),
            ..ForestConfig::default()
        }
    }

    #[test]
    fn test_forest_separates_blobs() {
        let forest = ForestTrainer::new(small_config()).train(&blobs()).unwrap();

        assert_eq!(forest.num_trees(), 15);
        assert!(forest.predict_proba(&[1.3, 2.0]).unwrap() > 0.8);
        assert!(forest.predict_proba(&[-1.3, 2.0]).unwrap() < 0.2);
    }

    #[test]
    fn test_forest_is_deterministic_across_threads() {
        let a = ForestTrainer::new(small_config()).train(&blobs()).unwrap();
        let b = ForestTrainer::new(small_config()).train(&blobs()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_leaves_are_probabilities() {
        let forest = ForestTrainer::new(small_config()).train(&blobs()).unwrap();
        for tree in &forest.trees {
            for leaf in tree.nodes.iter().filter_map(|n| n.leaf) {
                assert!((0.0..=1.0).contains(&leaf));
            }
        }
    }
}
