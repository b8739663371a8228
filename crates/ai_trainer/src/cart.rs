//! CART (Classification and Regression Tree) builder
//!
//! Exact-greedy second-order tree construction shared by the boosted trees
//! and the random forest. Each row carries a gradient `g` and hessian `h`;
//! a split's gain is
//!
//! `G_L²/(H_L+λ) + G_R²/(H_R+λ) - G²/(H+λ)`
//!
//! and a leaf outputs `-G/(H+λ)`.

use matchday_ai_core::gbdt::{Node, Tree};
use rand::seq::SliceRandom;
use rand::Rng;

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    /// Minimum hessian mass on each side of a split
    pub min_child_weight: f64,
    /// L2 regularisation on leaf outputs
    pub lambda: f64,
    /// Number of features sampled at every split; `None` considers all
    pub max_features: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_samples_leaf: 20,
            min_samples_split: 2,
            min_child_weight: 1e-3,
            lambda: 1.0,
            max_features: None,
        }
    }
}

/// A fitted tree plus the total gain contributed by each feature
#[derive(Clone, Debug)]
pub struct BuiltTree {
    pub tree: Tree,
    pub split_gains: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Build a regression tree using exact-greedy CART
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<f64>],
    gradients: &'a [f64],
    hessians: &'a [f64],
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        features: &'a [Vec<f64>],
        gradients: &'a [f64],
        hessians: &'a [f64],
        config: TreeConfig,
    ) -> Self {
        debug_assert_eq!(features.len(), gradients.len());
        debug_assert_eq!(features.len(), hessians.len());

        let feature_count = features.first().map(|row| row.len()).unwrap_or(0);

        Self {
            config,
            features,
            gradients,
            hessians,
            feature_count,
        }
    }

    /// Build a tree over `rows` (duplicates allowed) restricted to `allowed_features`
    pub fn build<R: Rng>(&self, rows: &[usize], allowed_features: &[usize], rng: &mut R) -> BuiltTree {
        let mut nodes = Vec::new();
        let mut split_gains = vec![0.0; self.feature_count];

        self.build_node(rows, allowed_features, 0, &mut nodes, &mut split_gains, rng);

        BuiltTree {
            tree: Tree::new(nodes, 1.0),
            split_gains,
        }
    }

    /// Recursively build tree nodes. Parents are pushed before their children.
    fn build_node<R: Rng>(
        &self,
        rows: &[usize],
        allowed_features: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        split_gains: &mut [f64],
        rng: &mut R,
    ) -> i32 {
        let current_idx = nodes.len() as i32;
        let (sum_g, sum_h) = self.sum_gradients_hessians(rows);

        let split = if depth >= self.config.max_depth
            || rows.len() < self.config.min_samples_split
            || rows.len() < 2 * self.config.min_samples_leaf.max(1)
        {
            None
        } else {
            let candidates = self.sample_features(allowed_features, rng);
            self.find_best_split(rows, &candidates, sum_g, sum_h)
        };

        let Some(split) = split else {
            nodes.push(Node::leaf(current_idx, self.leaf_value(sum_g, sum_h)));
            return current_idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| self.features[r][split.feature_idx] <= split.threshold);

        split_gains[split.feature_idx] += split.gain;
        nodes.push(Node::internal(
            current_idx,
            split.feature_idx as i32,
            split.threshold,
            -1,
            -1,
        ));

        let left_idx = self.build_node(&left_rows, allowed_features, depth + 1, nodes, split_gains, rng);
        let right_idx = self.build_node(&right_rows, allowed_features, depth + 1, nodes, split_gains, rng);

        let node = &mut nodes[current_idx as usize];
        node.left = left_idx;
        node.right = right_idx;

        current_idx
    }

    fn sample_features<R: Rng>(&self, allowed_features: &[usize], rng: &mut R) -> Vec<usize> {
        match self.config.max_features {
            Some(k) if k < allowed_features.len() => {
                let mut chosen: Vec<usize> =
                    allowed_features.choose_multiple(rng, k.max(1)).copied().collect();
                chosen.sort_unstable();
                chosen
            }
            _ => allowed_features.to_vec(),
        }
    }

    /// Scan each candidate feature in sorted order and keep the highest-gain split.
    /// Ties keep the earlier feature and the lower threshold.
    fn find_best_split(
        &self,
        rows: &[usize],
        candidates: &[usize],
        sum_g: f64,
        sum_h: f64,
    ) -> Option<SplitCandidate> {
        let lambda = self.config.lambda;
        let min_leaf = self.config.min_samples_leaf.max(1);
        let parent_score = score(sum_g, sum_h, lambda);
        let mut best: Option<SplitCandidate> = None;
        let mut column: Vec<(f64, f64, f64)> = Vec::with_capacity(rows.len());

        for &feature_idx in candidates {
            column.clear();
            column.extend(
                rows.iter()
                    .map(|&r| (self.features[r][feature_idx], self.gradients[r], self.hessians[r])),
            );
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut g_left = 0.0;
            let mut h_left = 0.0;

            for i in 0..column.len() - 1 {
                g_left += column[i].1;
                h_left += column[i].2;

                let (value, next) = (column[i].0, column[i + 1].0);
                if value == next {
                    continue;
                }

                let n_left = i + 1;
                if n_left < min_leaf || column.len() - n_left < min_leaf {
                    continue;
                }

                let g_right = sum_g - g_left;
                let h_right = sum_h - h_left;
                if h_left < self.config.min_child_weight || h_right < self.config.min_child_weight {
                    continue;
                }

                let gain = score(g_left, h_left, lambda) + score(g_right, h_right, lambda) - parent_score;
                if !(gain > 1e-12) {
                    continue;
                }

                if best.map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold: midpoint(value, next),
                        gain,
                    });
                }
            }
        }

        best
    }

    fn sum_gradients_hessians(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &r| {
            (g + self.gradients[r], h + self.hessians[r])
        })
    }

    /// Optimal leaf value: -G/(H+λ)
    fn leaf_value(&self, sum_g: f64, sum_h: f64) -> f64 {
        let denom = sum_h + self.config.lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -sum_g / denom
    }
}

fn score(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom <= 0.0 {
        0.0
    } else {
        g * g / denom
    }
}

/// Threshold strictly below `hi` so every `lo` row goes left
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid < hi {
        mid
    } else {
        lo
    }
}
