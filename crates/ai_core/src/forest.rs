//! Random-forest classifier
//!
//! Each tree's leaves hold the (class-weighted) positive fraction of the
//! bootstrap sample that reached them; the forest averages them.

use crate::classifier::Classifier;
use crate::errors::{ModelError, Result};
use crate::gbdt::Tree;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomForestModel {
    pub feature_count: usize,
    pub trees: Vec<Tree>,
}

impl RandomForestModel {
    pub fn new(feature_count: usize, trees: Vec<Tree>) -> Self {
        Self {
            feature_count,
            trees,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(ModelError::ValidationFailed(
                "Random forest has no trees".to_string(),
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_count).map_err(|e| {
                ModelError::ValidationFailed(format!("Forest tree {} validation failed: {}", i, e))
            })?;
            let out_of_range = tree
                .nodes
                .iter()
                .filter_map(|n| n.leaf)
                .any(|v| !(0.0..=1.0).contains(&v));
            if out_of_range {
                return Err(ModelError::ValidationFailed(format!(
                    "Forest tree {i} has a leaf outside [0, 1]"
                )));
            }
        }
        Ok(())
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForestModel {
    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64> {
        self.check_input(features)?;
        if self.trees.is_empty() {
            return Err(ModelError::ValidationFailed(
                "Random forest has no trees".to_string(),
            ));
        }
        let sum: f64 = self.trees.iter().map(|t| t.evaluate(features)).sum();
        Ok((sum / self.trees.len() as f64).clamp(0.0, 1.0))
    }
}
