//! Binary classification metrics used to evaluate the ensemble
//!
//! Labels are 0.0 / 1.0; predictions are positive-class probabilities.

/// Probabilities are clipped to `[EPS, 1 - EPS]` before taking logs
const EPS: f64 = 1e-15;

/// Fraction of samples where `p > 0.5` matches the label
pub fn accuracy(labels: &[f64], probs: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = labels
        .iter()
        .zip(probs)
        .filter(|(y, p)| (**p > 0.5) == (**y >= 0.5))
        .count();
    correct as f64 / labels.len() as f64
}

/// Mean binary cross-entropy
pub fn log_loss(labels: &[f64], probs: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = labels
        .iter()
        .zip(probs)
        .map(|(y, p)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / labels.len() as f64
}

/// Mean squared error between probability and label
pub fn brier_score(labels: &[f64], probs: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = labels.iter().zip(probs).map(|(y, p)| (p - y).powi(2)).sum();
    total / labels.len() as f64
}

/// Area under the ROC curve via the rank-sum statistic (ties get average rank).
///
/// Returns `None` when only one class is present.
pub fn roc_auc(labels: &[f64], probs: &[f64]) -> Option<f64> {
    let n = labels.len().min(probs.len());
    let positives = labels[..n].iter().filter(|y| **y >= 0.5).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && probs[order[j + 1]] == probs[order[i]] {
            j += 1;
        }
        // 1-based average rank for the tie block [i, j]
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = (0..n).filter(|&k| labels[k] >= 0.5).map(|k| ranks[k]).sum();
    let p = positives as f64;
    Some((pos_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn perfect_predictions() {
        let y = [0.0, 1.0, 1.0, 0.0];
        let p = [0.1, 0.9, 0.8, 0.2];
        assert_eq!(accuracy(&y, &p), 1.0);
        assert_eq!(roc_auc(&y, &p), Some(1.0));
        assert!(log_loss(&y, &p) < 0.25);
        assert!(brier_score(&y, &p) < 0.05);
    }

    #[test]
    fn constant_predictions_have_chance_auc() {
        let y = [0.0, 1.0, 0.0, 1.0];
        let p = [0.5; 4];
        assert_eq!(roc_auc(&y, &p), Some(0.5));
        assert_eq!(brier_score(&y, &p), 0.25);
    }

    #[test]
    fn single_class_has_no_auc() {
        assert_eq!(roc_auc(&[1.0, 1.0], &[0.3, 0.7]), None);
    }

    #[test]
    fn log_loss_is_finite_for_saturated_probabilities() {
        let loss = log_loss(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(loss.is_finite());
        assert!(loss > 30.0);
    }

    proptest! {
        #[test]
        fn brier_and_auc_stay_in_unit_interval(
            rows in prop::collection::vec((0.0f64..=1.0, any::<bool>()), 2..64)
        ) {
            let probs: Vec<f64> = rows.iter().map(|r| r.0).collect();
            let labels: Vec<f64> = rows.iter().map(|r| if r.1 { 1.0 } else { 0.0 }).collect();
            let brier = brier_score(&labels, &probs);
            prop_assert!((0.0..=1.0).contains(&brier));
            if let Some(auc) = roc_auc(&labels, &probs) {
                prop_assert!((0.0..=1.0).contains(&auc));
            }
        }
    }
}
