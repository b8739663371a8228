//! Gradient Boosted Decision Tree inference
//!
//! Trees use the flat node layout from [`tree`]: internal nodes send a
//! sample left when `feature <= threshold`, leaves carry an `f64` output.
//! Boosted models accumulate `weight * leaf` in log-odds space and apply a
//! logistic link; the same `Tree` type backs the random forest, whose
//! leaves hold positive-class fractions instead.
//!
//! # Usage
//!
//! ```rust
//! use matchday_ai_core::gbdt::{BoostedTreesModel, Node, Tree};
//! use matchday_ai_core::Classifier;
//!
//! let tree = Tree::new(
//!     vec![
//!         Node::internal(0, 0, 1500.0, 1, 2),
//!         Node::leaf(1, -0.4),
//!         Node::leaf(2, 0.6),
//!     ],
//!     0.1,
//! );
//! let model = BoostedTreesModel::new(1, 0.0, vec![tree], vec![1.0]);
//! let p = model.predict_proba(&[1620.0]).unwrap();
//! assert!(p > 0.5);
//! ```

pub mod model;
pub mod tree;

pub use model::BoostedTreesModel;
pub use tree::{Node, Tree};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::Classifier;

    fn elo_stump(weight: f64) -> Tree {
        Tree::new(
            vec![
                Node::internal(0, 0, 0.0, 1, 2),
                Node::leaf(1, -1.0),
                Node::leaf(2, 1.0),
            ],
            weight,
        )
    }

    #[test]
    fn test_probability_is_monotone_in_tree_weight() {
        let weak = BoostedTreesModel::new(1, 0.0, vec![elo_stump(0.1)], vec![1.0]);
        let strong = BoostedTreesModel::new(1, 0.0, vec![elo_stump(1.0)], vec![1.0]);

        let p_weak = weak.predict_proba(&[10.0]).unwrap();
        let p_strong = strong.predict_proba(&[10.0]).unwrap();
        assert!(p_weak > 0.5);
        assert!(p_strong > p_weak);
    }

    #[test]
    fn test_deterministic_inference_repeated() {
        let model = BoostedTreesModel::new(1, 0.3, vec![elo_stump(0.5); 4], vec![1.0]);
        let first = model.predict_proba(&[-2.0]).unwrap();
        for _ in 0..100 {
            assert_eq!(model.predict_proba(&[-2.0]).unwrap(), first);
        }
    }

    #[test]
    fn test_invalid_tree_fails_model_validation() {
        let broken = Tree::new(vec![Node::internal(0, 4, 0.0, 1, 2)], 1.0);
        let model = BoostedTreesModel::new(1, 0.0, vec![broken], vec![1.0]);
        assert!(model.validate().is_err());
    }
}
