//! L2-regularised logistic regression with Platt calibration
//!
//! The linear model minimises the weighted log-loss plus `‖w‖² / (2C)` by
//! full-batch gradient descent. The calibrator is fitted on out-of-fold
//! decision values (rows assigned to folds by `i % folds`) with the
//! Newton method of Lin, Lin and Weng.

use matchday_ai_core::{sigmoid, CalibratedLogistic, LogisticModel, PlattCalibrator};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::errors::TrainerError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticConfig {
    /// Inverse regularisation strength
    pub c: f64,
    pub max_iter: usize,
    pub step_size: f64,
    /// Stop once every gradient component is below this
    pub tolerance: f64,
    pub balanced: bool,
    pub calibration_folds: usize,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            step_size: 0.5,
            tolerance: 1e-6,
            balanced: true,
            calibration_folds: 3,
        }
    }
}

pub struct LogisticTrainer {
    config: LogisticConfig,
}

impl LogisticTrainer {
    pub fn new(config: LogisticConfig) -> Self {
        Self { config }
    }

    /// Fit on already-scaled rows and calibrate on out-of-fold scores
    pub fn train(&self, data: &Dataset) -> Result<CalibratedLogistic, TrainerError> {
        if data.is_empty() || data.feature_count == 0 {
            return Err(TrainerError::Training(
                "logistic regression needs a non-empty training set".to_string(),
            ));
        }

        let weights = self.sample_weights(data);
        let all: Vec<usize> = (0..data.len()).collect();
        let model = self.fit_linear(data, &all, &weights);

        let folds = self.config.calibration_folds;
        let calibrator = if folds >= 2 && data.len() >= folds * 2 {
            let mut decisions = vec![0.0; data.len()];
            for fold in 0..folds {
                let train_rows: Vec<usize> = all.iter().copied().filter(|i| i % folds != fold).collect();
                let fold_model = self.fit_linear(data, &train_rows, &weights);
                for i in all.iter().copied().filter(|i| i % folds == fold) {
                    decisions[i] = fold_model.decision_function(&data.features[i]);
                }
            }
            fit_platt(&decisions, &data.labels)
        } else {
            tracing::warn!(rows = data.len(), "Too few rows to calibrate, using raw logistic output");
            PlattCalibrator::identity()
        };

        tracing::info!(a = calibrator.a, b = calibrator.b, "Fitted logistic calibrator");

        let calibrated = CalibratedLogistic::new(model, calibrator);
        calibrated.validate()?;
        Ok(calibrated)
    }

    fn sample_weights(&self, data: &Dataset) -> Vec<f64> {
        if self.config.balanced {
            data.balanced_weights()
        } else {
            vec![1.0; data.len()]
        }
    }

    fn fit_linear(&self, data: &Dataset, rows: &[usize], weights: &[f64]) -> LogisticModel {
        let d = data.feature_count;
        let total_weight: f64 = rows.iter().map(|&i| weights[i]).sum::<f64>().max(f64::EPSILON);
        let penalty = 1.0 / (self.config.c * total_weight);

        let mut coefficients = vec![0.0; d];
        let mut intercept = 0.0;
        let mut grad_w = vec![0.0; d];

        for iteration in 0..self.config.max_iter {
            grad_w.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_b = 0.0;

            for &i in rows {
                let x = &data.features[i];
                let z = coefficients.iter().zip(x).fold(intercept, |acc, (w, v)| acc + w * v);
                let residual = weights[i] * (sigmoid(z) - data.labels[i]) / total_weight;
                for (g, v) in grad_w.iter_mut().zip(x) {
                    *g += residual * v;
                }
                grad_b += residual;
            }
            for (g, w) in grad_w.iter_mut().zip(&coefficients) {
                *g += penalty * w;
            }

            let max_grad = grad_w.iter().fold(grad_b.abs(), |m, g| m.max(g.abs()));
            if max_grad < self.config.tolerance {
                tracing::debug!(iteration, "Logistic regression converged");
                break;
            }

            for (w, g) in coefficients.iter_mut().zip(&grad_w) {
                *w -= self.config.step_size * g;
            }
            intercept -= self.config.step_size * grad_b;
        }

        LogisticModel::new(coefficients, intercept)
    }
}

/// Fit `P(y=1|f) = 1 / (1 + exp(A·f + B))` with smoothed targets
pub fn fit_platt(decisions: &[f64], labels: &[f64]) -> PlattCalibrator {
    const MAX_ITER: usize = 100;
    const MIN_STEP: f64 = 1e-10;
    const SIGMA: f64 = 1e-12;
    const EPS: f64 = 1e-5;

    let prior1 = labels.iter().filter(|y| **y >= 0.5).count() as f64;
    let prior0 = labels.len() as f64 - prior1;
    let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
    let lo_target = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = labels
        .iter()
        .map(|y| if *y >= 0.5 { hi_target } else { lo_target })
        .collect();

    let objective = |a: f64, b: f64| -> f64 {
        decisions
            .iter()
            .zip(&targets)
            .map(|(f, t)| {
                let fab = f * a + b;
                if fab >= 0.0 {
                    t * fab + (-fab).exp().ln_1p()
                } else {
                    (t - 1.0) * fab + fab.exp().ln_1p()
                }
            })
            .sum()
    };

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    for _ in 0..MAX_ITER {
        let (mut h11, mut h22, mut h21, mut g1, mut g2) = (SIGMA, SIGMA, 0.0, 0.0, 0.0);
        for (f, t) in decisions.iter().zip(&targets) {
            let fab = f * a + b;
            let (p, q) = if fab >= 0.0 {
                let e = (-fab).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = fab.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }

        if g1.abs() < EPS && g2.abs() < EPS {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut step = 1.0;
        while step >= MIN_STEP {
            let (new_a, new_b) = (a + step * da, b + step * db);
            let new_f = objective(new_a, new_b);
            if new_f < fval + 1e-4 * step * gd {
                a = new_a;
                b = new_b;
                fval = new_f;
                break;
            }
            step /= 2.0;
        }
        if step < MIN_STEP {
            tracing::debug!("Platt line search failed to make progress");
            break;
        }
    }

    PlattCalibrator::new(a, b)
}
