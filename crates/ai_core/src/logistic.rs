//! Logistic regression with Platt calibration
//!
//! The logistic model is fitted on standardised features, so callers must pass
//! scaled vectors to [`CalibratedLogistic::predict_proba`].

use crate::classifier::{sigmoid, Classifier};
use crate::errors::{ModelError, Result};
use serde::{Deserialize, Serialize};

/// Linear decision function `w·x + b`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LogisticModel {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
        }
    }

    /// Signed distance to the decision boundary (log-odds before calibration)
    pub fn decision_function(&self, features: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(features)
            .fold(self.intercept, |acc, (w, x)| acc + w * x)
    }

    /// Uncalibrated probability of the positive class
    pub fn raw_proba(&self, features: &[f64]) -> f64 {
        sigmoid(self.decision_function(features))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.intercept.is_finite() || self.coefficients.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::ValidationFailed(
                "Logistic coefficients must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Platt sigmoid mapping a decision value `f` to `1 / (1 + exp(a·f + b))`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlattCalibrator {
    pub a: f64,
    pub b: f64,
}

impl PlattCalibrator {
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    /// Calibrator that reproduces the uncalibrated logistic output
    pub fn identity() -> Self {
        Self { a: -1.0, b: 0.0 }
    }

    pub fn calibrate(&self, decision: f64) -> f64 {
        sigmoid(-(self.a * decision + self.b))
    }
}

/// Logistic regression followed by a Platt calibrator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibratedLogistic {
    pub model: LogisticModel,
    pub calibrator: PlattCalibrator,
}

impl CalibratedLogistic {
    pub fn new(model: LogisticModel, calibrator: PlattCalibrator) -> Self {
        Self { model, calibrator }
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        if !self.calibrator.a.is_finite() || !self.calibrator.b.is_finite() {
            return Err(ModelError::ValidationFailed(
                "Calibrator parameters must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

impl Classifier for CalibratedLogistic {
    fn feature_count(&self) -> usize {
        self.model.coefficients.len()
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64> {
        self.check_input(features)?;
        let decision = self.model.decision_function(features);
        Ok(self.calibrator.calibrate(decision))
    }
}
