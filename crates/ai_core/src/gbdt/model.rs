//! Boosted-trees binary classifier
//!
//! The raw score is `base_score + Σ tree.weight * tree.evaluate(x)` in
//! log-odds space; the probability is its logistic transform.

use super::tree::Tree;
use crate::classifier::{sigmoid, Classifier};
use crate::errors::{ModelError, Result};
use serde::{Deserialize, Serialize};

/// Current on-disk format version
pub const FORMAT_VERSION: i32 = 1;

/// Gradient-boosted decision trees with a logistic link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoostedTreesModel {
    /// Model format version
    pub version: i32,

    /// Width of the feature vector the model was fitted on
    pub feature_count: usize,

    /// Initial log-odds before any tree is applied
    pub base_score: f64,

    /// Boosting rounds in order; each tree's weight is its shrinkage
    pub trees: Vec<Tree>,

    /// Normalised total split gain per feature (sums to 1 unless no split was made)
    pub feature_importances: Vec<f64>,
}

impl BoostedTreesModel {
    /// Create a model from fitted trees
    pub fn new(
        feature_count: usize,
        base_score: f64,
        trees: Vec<Tree>,
        feature_importances: Vec<f64>,
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            feature_count,
            base_score,
            trees,
            feature_importances,
        }
    }

    /// Validate model structure
    pub fn validate(&self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(ModelError::ValidationFailed(format!(
                "Unsupported boosted-trees format version: {}",
                self.version
            )));
        }
        if !self.base_score.is_finite() {
            return Err(ModelError::ValidationFailed(
                "Base score is not finite".to_string(),
            ));
        }
        if self.feature_importances.len() != self.feature_count {
            return Err(ModelError::ValidationFailed(format!(
                "Importance vector has {} entries for {} features",
                self.feature_importances.len(),
                self.feature_count
            )));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_count).map_err(|e| {
                ModelError::ValidationFailed(format!("Tree {} validation failed: {}", i, e))
            })?;
        }
        Ok(())
    }

    /// Raw log-odds score without width checks
    pub fn raw_score(&self, features: &[f64]) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + tree.weight * tree.evaluate(features))
    }

    /// Get number of trees in the model
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for BoostedTreesModel {
    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64> {
        self.check_input(features)?;
        Ok(sigmoid(self.raw_score(features)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::tree::Node;

    #[test]
    fn test_two_tree_model_inference() {
        let tree1 = Tree::new(
            vec![
                Node::internal(0, 0, 50.0, 1, 2),
                Node::leaf(1, -1.0),
                Node::leaf(2, 1.0),
            ],
            0.5,
        );
        let tree2 = Tree::new(
            vec![
                Node::internal(0, 1, 30.0, 1, 2),
                Node::leaf(1, -2.0),
                Node::leaf(2, 2.0),
            ],
            0.5,
        );
        let model = BoostedTreesModel::new(2, 0.0, vec![tree1, tree2], vec![0.5, 0.5]);
        assert!(model.validate().is_ok());

        // left, left: 0.5 * -1 + 0.5 * -2 = -1.5
        assert!((model.raw_score(&[30.0, 20.0]) + 1.5).abs() < 1e-12);
        // right, right: 0.5 * 1 + 0.5 * 2 = 1.5
        let p = model.predict_proba(&[60.0, 40.0]).unwrap();
        assert!((p - sigmoid(1.5)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_model_returns_base_probability() {
        let model = BoostedTreesModel::new(3, 0.0, Vec::new(), vec![0.0; 3]);
        assert_eq!(model.predict_proba(&[1.0, 2.0, 3.0]).unwrap(), 0.5);
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let model = BoostedTreesModel::new(3, 0.0, Vec::new(), vec![0.0; 3]);
        let err = model.predict_proba(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::FeatureCountMismatch { expected: 3, actual: 1 }
        ));
    }

    #[test]
    fn test_bincode_roundtrip_preserves_predictions() {
        let tree = Tree::new(
            vec![
                Node::internal(0, 0, 0.5, 1, 2),
                Node::leaf(1, -0.3),
                Node::leaf(2, 0.9),
            ],
            0.1,
        );
        let original = BoostedTreesModel::new(1, 0.2, vec![tree], vec![1.0]);
        let bytes = crate::serialization::encode(&original).unwrap();
        let restored: BoostedTreesModel = crate::serialization::decode(&bytes).unwrap();
        assert_eq!(original, restored);
        assert_eq!(
            original.predict_proba(&[0.7]).unwrap(),
            restored.predict_proba(&[0.7]).unwrap()
        );
    }
}
