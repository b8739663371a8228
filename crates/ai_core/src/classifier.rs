//! Shared classifier interface

use crate::errors::{ModelError, Result};

/// A fitted binary classifier
pub trait Classifier: Send + Sync {
    /// Width of the feature vector the model was fitted on
    fn feature_count(&self) -> usize;

    /// Probability of the positive class for a single feature vector
    fn predict_proba(&self, features: &[f64]) -> Result<f64>;

    /// Reject inputs whose width differs from the fitted width or that carry
    /// non-finite values.
    fn check_input(&self, features: &[f64]) -> Result<()> {
        let expected = self.feature_count();
        if features.len() != expected {
            return Err(ModelError::FeatureCountMismatch {
                expected,
                actual: features.len(),
            });
        }
        if let Some(idx) = features.iter().position(|v| !v.is_finite()) {
            return Err(ModelError::InvalidInput(format!(
                "feature {idx} is not finite"
            )));
        }
        Ok(())
    }
}

/// Numerically stable logistic function
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
