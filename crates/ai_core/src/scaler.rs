//! Standard (z-score) feature scaler

use crate::errors::{ModelError, Result};
use serde::{Deserialize, Serialize};

/// Per-feature `(x - mean) / scale`, fitted on a training matrix
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on row-major samples. Zero-variance features get a scale of 1.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(ModelError::InvalidInput(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        };
        let width = first.len();
        let n = rows.len() as f64;

        let mut mean = vec![0.0; width];
        for row in rows {
            if row.len() != width {
                return Err(ModelError::FeatureCountMismatch {
                    expected: width,
                    actual: row.len(),
                });
            }
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2);
            }
        }
        let scale = var
            .into_iter()
            .map(|s| {
                let std = (s / n).sqrt();
                if std > f64::EPSILON && std.is_finite() {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self { mean, scale })
    }

    pub fn feature_count(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.mean.len() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.mean.len(),
                actual: features.len(),
            });
        }
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }

    pub fn transform_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.mean.len() != self.scale.len() {
            return Err(ModelError::ValidationFailed(format!(
                "Scaler has {} means and {} scales",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0)
            || self.mean.iter().any(|m| !m.is_finite())
        {
            return Err(ModelError::ValidationFailed(
                "Scaler parameters must be finite with positive scales".to_string(),
            ));
        }
        Ok(())
    }
}
