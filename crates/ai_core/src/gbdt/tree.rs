//! Decision tree structures shared by boosted trees and random forests
//!
//! Trees are stored as flat node arrays; node 0 is the root.

use serde::{Deserialize, Serialize};

/// A decision tree node (internal or leaf)
///
/// For internal nodes:
/// - `feature_idx >= 0`: index into feature vector
/// - `left` and `right` point to child node indices
/// - `leaf` is `None`
///
/// For leaf nodes:
/// - `feature_idx == -1` indicates this is a leaf
/// - `leaf` contains the node output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Node ID (for reference, not used in traversal)
    pub id: i32,

    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Feature index to split on (-1 for leaf nodes)
    pub feature_idx: i32,

    /// Split threshold; samples with `value <= threshold` go left
    pub threshold: f64,

    /// Leaf output (Some for leaf nodes, None for internal nodes)
    pub leaf: Option<f64>,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(id: i32, feature_idx: i32, threshold: f64, left: i32, right: i32) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
        }
    }

    /// Create a new leaf node
    pub fn leaf(id: i32, value: f64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            leaf: Some(value),
        }
    }

    /// Check if this node is a leaf
    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }
}

/// A single decision tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,

    /// Multiplier applied to this tree's output when aggregating
    pub weight: f64,
}

impl Tree {
    /// Create a new tree with the given nodes and weight
    pub fn new(nodes: Vec<Node>, weight: f64) -> Self {
        Self { nodes, weight }
    }

    /// Evaluate this tree on a feature vector, returning the raw leaf output.
    ///
    /// Malformed trees evaluate to 0.0; call [`Tree::validate`] before
    /// exposing a tree to inference.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };

            if node.is_leaf() {
                return node.leaf.unwrap_or(0.0);
            }

            let Some(&value) = features.get(node.feature_idx as usize) else {
                return 0.0;
            };

            let next = if value <= node.threshold {
                node.left
            } else {
                node.right
            };
            if next < 0 {
                return 0.0;
            }
            idx = next as usize;
        }
    }

    /// Depth of the deepest leaf (root-only tree has depth 0)
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize, depth: usize) -> usize {
            match nodes.get(idx) {
                Some(node) if !node.is_leaf() => walk(nodes, node.left as usize, depth + 1)
                    .max(walk(nodes, node.right as usize, depth + 1)),
                _ => depth,
            }
        }
        walk(&self.nodes, 0, 0)
    }

    /// Validate tree structure against the expected feature width
    pub fn validate(&self, feature_count: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }
        if !self.weight.is_finite() {
            return Err("Tree weight is not finite".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                match node.leaf {
                    Some(v) if v.is_finite() => {}
                    Some(_) => return Err(format!("Leaf node {i} has non-finite value")),
                    None => return Err(format!("Leaf node {i} has no leaf value")),
                }
                continue;
            }

            // Children must point forward so traversal always terminates
            for (side, child) in [("left", node.left), ("right", node.right)] {
                if child <= i as i32 || child as usize >= self.nodes.len() {
                    return Err(format!("Node {i} has invalid {side} child: {child}"));
                }
            }

            if node.feature_idx < 0 || node.feature_idx as usize >= feature_count {
                return Err(format!(
                    "Internal node {} has invalid feature index: {}",
                    i, node.feature_idx
                ));
            }
            if !node.threshold.is_finite() {
                return Err(format!("Internal node {i} has non-finite threshold"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree::new(
            vec![
                Node::internal(0, 0, 50.0, 1, 2),
                Node::leaf(1, 0.25),
                Node::leaf(2, 0.75),
            ],
            1.0,
        )
    }

    #[test]
    fn test_node_creation() {
        let internal = Node::internal(0, 3, 1.5, 1, 2);
        assert_eq!(internal.feature_idx, 3);
        assert_eq!(internal.left, 1);
        assert_eq!(internal.right, 2);
        assert!(!internal.is_leaf());

        let leaf = Node::leaf(1, -0.4);
        assert_eq!(leaf.feature_idx, -1);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.leaf, Some(-0.4));
    }

    #[test]
    fn test_tree_evaluation() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[30.0]), 0.25);
        assert_eq!(tree.evaluate(&[50.0]), 0.25); // Equal goes left
        assert_eq!(tree.evaluate(&[60.0]), 0.75);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_tree_validation() {
        assert!(stump().validate(1).is_ok());
        // Feature 0 is out of range for a zero-width model
        assert!(stump().validate(0).is_err());

        let invalid_tree = Tree::new(
            vec![
                Node::internal(0, 0, 50.0, 5, 2),
                Node::leaf(1, 0.1),
                Node::leaf(2, 0.2),
            ],
            1.0,
        );
        assert!(invalid_tree.validate(1).is_err());

        let cyclic = Tree::new(
            vec![Node::internal(0, 0, 1.0, 0, 0)],
            1.0,
        );
        assert!(cyclic.validate(1).is_err());
    }
}
