//! Labelled dataset loading and preprocessing
//!
//! Rows are numeric feature vectors with a binary label (0 or 1). Provides
//! CSV loading, deterministic shuffling and train/validation splitting.

use anyhow::{Context, Result};
use std::path::Path;

use crate::deterministic::xxhash64_f64;

/// Training dataset with numeric features and 0/1 labels
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    pub feature_count: usize,
}

/// Train/validation matrices handed to the fitting code
#[derive(Clone, Debug)]
pub struct TrainingSplit {
    pub train: Dataset,
    pub validation: Dataset,
}

impl Dataset {
    /// Build a dataset, checking that rows are rectangular and labels binary
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<f64>) -> Result<Self> {
        if features.len() != labels.len() {
            anyhow::bail!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            );
        }
        let feature_count = features.first().map(|r| r.len()).unwrap_or(0);
        for (i, row) in features.iter().enumerate() {
            if row.len() != feature_count {
                anyhow::bail!(
                    "Row {}: expected {} features, got {}",
                    i,
                    feature_count,
                    row.len()
                );
            }
        }
        if let Some(bad) = labels.iter().find(|y| **y != 0.0 && **y != 1.0) {
            anyhow::bail!("Labels must be 0 or 1, found {}", bad);
        }
        Ok(Self {
            features,
            labels,
            feature_count,
        })
    }

    /// Load dataset from CSV file
    /// Expected format: feature1,feature2,...,label
    /// A first line that does not parse as numbers is treated as a header.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).context("Failed to read CSV file")?;

        let mut features = Vec::new();
        let mut labels = Vec::new();
        let mut feature_count = 0;

        for (line_idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
            if parts.len() < 2 {
                anyhow::bail!("Line {}: expected at least 2 columns", line_idx + 1);
            }

            if features.is_empty() && parts[0].parse::<f64>().is_err() {
                // header row
                continue;
            }

            if feature_count == 0 {
                feature_count = parts.len() - 1;
            } else if parts.len() - 1 != feature_count {
                anyhow::bail!(
                    "Line {}: expected {} features, got {}",
                    line_idx + 1,
                    feature_count,
                    parts.len() - 1
                );
            }

            let mut row = Vec::with_capacity(feature_count);
            for (i, part) in parts.iter().take(feature_count).enumerate() {
                let val = part.parse::<f64>().with_context(|| {
                    format!("Line {}, column {}: invalid number", line_idx + 1, i + 1)
                })?;
                row.push(val);
            }

            let label = parts[feature_count]
                .parse::<f64>()
                .with_context(|| format!("Line {}: invalid label", line_idx + 1))?;

            features.push(row);
            labels.push(label);
        }

        if features.is_empty() {
            anyhow::bail!("Dataset is empty");
        }

        Self::new(features, labels)
    }

    /// Deterministically shuffle the dataset using seed
    pub fn shuffle(&mut self, seed: u64) {
        let mut order: Vec<(u64, usize)> = self
            .features
            .iter()
            .enumerate()
            .map(|(i, row)| (xxhash64_f64(row, seed ^ i as u64), i))
            .collect();
        order.sort_unstable();

        let features = order.iter().map(|(_, i)| self.features[*i].clone()).collect();
        let labels = order.iter().map(|(_, i)| self.labels[*i]).collect();
        self.features = features;
        self.labels = labels;
    }

    /// Split off the trailing `validation_fraction` of rows as a validation set.
    /// Both sides keep at least one row.
    pub fn split(self, validation_fraction: f64) -> Result<TrainingSplit> {
        let n = self.len();
        if n < 2 {
            anyhow::bail!("Need at least 2 rows to split, have {}", n);
        }
        if !(validation_fraction > 0.0 && validation_fraction < 1.0) {
            anyhow::bail!("Validation fraction must be in (0, 1), got {}", validation_fraction);
        }
        let n_val = ((n as f64 * validation_fraction).round() as usize).clamp(1, n - 1);
        let n_train = n - n_val;

        let mut features = self.features;
        let mut labels = self.labels;
        let val_features = features.split_off(n_train);
        let val_labels = labels.split_off(n_train);

        Ok(TrainingSplit {
            train: Dataset {
                features,
                labels,
                feature_count: self.feature_count,
            },
            validation: Dataset {
                features: val_features,
                labels: val_labels,
                feature_count: self.feature_count,
            },
        })
    }

    /// Keep only the first `n` rows
    pub fn truncate(&mut self, n: usize) {
        self.features.truncate(n);
        self.labels.truncate(n);
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Number of positive labels
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|y| **y >= 0.5).count()
    }

    /// Per-sample weights that balance the two classes (n / (2 * n_class))
    pub fn balanced_weights(&self) -> Vec<f64> {
        let n = self.len() as f64;
        let pos = self.positives() as f64;
        let neg = n - pos;
        let w_pos = if pos > 0.0 { n / (2.0 * pos) } else { 1.0 };
        let w_neg = if neg > 0.0 { n / (2.0 * neg) } else { 1.0 };
        self.labels
            .iter()
            .map(|y| if *y >= 0.5 { w_pos } else { w_neg })
            .collect()
    }

    /// Get (min, max) per feature
    pub fn feature_stats(&self) -> Vec<(f64, f64)> {
        let mut stats = vec![(f64::INFINITY, f64::NEG_INFINITY); self.feature_count];

        for row in &self.features {
            for (i, &val) in row.iter().enumerate() {
                stats[i].0 = stats[i].0.min(val);
                stats[i].1 = stats[i].1.max(val);
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "home_elo,away_elo,rest_days,home_win")?;
        writeln!(file, "1500,1400,3,1")?;
        writeln!(file, "1450,1550,2,0")?;
        writeln!(file, "1600,1500,1,1")?;
        writeln!(file, "1380,1420,4,0")?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn test_load_csv() -> Result<()> {
        let file = create_test_csv()?;
        let dataset = Dataset::from_csv(file.path())?;

        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.feature_count, 3);
        assert_eq!(dataset.features[0], vec![1500.0, 1400.0, 3.0]);
        assert_eq!(dataset.labels[0], 1.0);
        assert_eq!(dataset.positives(), 2);

        Ok(())
    }

    #[test]
    fn test_non_binary_label_rejected() {
        let result = Dataset::new(vec![vec![1.0]], vec![2.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_shuffle_determinism() -> Result<()> {
        let file = create_test_csv()?;
        let mut ds1 = Dataset::from_csv(file.path())?;
        let mut ds2 = ds1.clone();

        ds1.shuffle(42);
        ds2.shuffle(42);

        assert_eq!(ds1, ds2);
        Ok(())
    }

    #[test]
    fn test_split_keeps_both_sides_non_empty() -> Result<()> {
        let file = create_test_csv()?;
        let dataset = Dataset::from_csv(file.path())?;

        let split = dataset.split(0.2)?;
        assert_eq!(split.train.len(), 3);
        assert_eq!(split.validation.len(), 1);
        assert_eq!(split.validation.feature_count, 3);
        Ok(())
    }

    #[test]
    fn test_balanced_weights_equalise_class_mass() {
        let ds = Dataset::new(
            vec![vec![0.0], vec![0.0], vec![0.0], vec![1.0]],
            vec![0.0, 0.0, 0.0, 1.0],
        )
        .unwrap();
        let w = ds.balanced_weights();
        let neg_mass: f64 = w[..3].iter().sum();
        assert!((neg_mass - w[3]).abs() < 1e-12);
    }

    #[test]
    fn test_feature_stats() -> Result<()> {
        let file = create_test_csv()?;
        let dataset = Dataset::from_csv(file.path())?;

        let stats = dataset.feature_stats();
        assert_eq!(stats[0], (1380.0, 1600.0));
        assert_eq!(stats[2], (1.0, 4.0));
        Ok(())
    }
}
