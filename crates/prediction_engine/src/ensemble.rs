//! Ensemble predictor
//!
//! Each member gives a positive-class probability; the ensemble is their
//! weighted sum and its confidence falls with member disagreement:
//!
//! `confidence = clamp(1 - 2·σ(p_bt, p_lr, p_rf), 0.5, 1.0)`
//!
//! with σ the population standard deviation. Logistic regression reads the
//! scaled vector; the tree models read the raw one.

use matchday_ai_core::Classifier;
use rand::Rng;
use std::collections::BTreeMap;

use crate::errors::{EngineError, Result};
use crate::store::ModelBundle;
use crate::types::{ModelKind, ScoreSource};

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleScore {
    pub probability: f64,
    pub confidence: f64,
    pub source: ScoreSource,
    /// Per-member probabilities (empty for placeholders)
    pub components: BTreeMap<ModelKind, f64>,
}

/// Per-member probabilities for one raw feature vector
pub fn component_probabilities(
    bundle: &ModelBundle,
    features: &[f64],
) -> Result<BTreeMap<ModelKind, f64>> {
    let expected = bundle.feature_names.len();
    if features.len() != expected {
        return Err(EngineError::FeatureWidthMismatch {
            expected,
            actual: features.len(),
        });
    }

    let scaled = bundle.scaler.transform(features)?;

    Ok(BTreeMap::from([
        (ModelKind::BoostedTrees, bundle.boosted.predict_proba(features)?),
        (ModelKind::Logistic, bundle.logistic.predict_proba(&scaled)?),
        (ModelKind::RandomForest, bundle.forest.predict_proba(features)?),
    ]))
}

/// Weighted sum of member probabilities
pub fn combine(weights: &BTreeMap<ModelKind, f64>, probabilities: &BTreeMap<ModelKind, f64>) -> f64 {
    probabilities
        .iter()
        .map(|(kind, p)| weights.get(kind).copied().unwrap_or(0.0) * p)
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

/// Agreement-based confidence in [0.5, 1.0]
pub fn confidence(probabilities: &[f64]) -> f64 {
    let Some(first) = probabilities.first() else {
        return 0.5;
    };
    if probabilities.iter().all(|p| p == first) {
        return 1.0;
    }

    let n = probabilities.len() as f64;
    let mean = probabilities.iter().sum::<f64>() / n;
    let variance = probabilities.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;

    (1.0 - 2.0 * variance.sqrt()).clamp(0.5, 1.0)
}

/// Score a raw feature vector against a trained bundle
pub fn score(bundle: &ModelBundle, features: &[f64]) -> Result<EnsembleScore> {
    let components = component_probabilities(bundle, features)?;
    let values: Vec<f64> = components.values().copied().collect();

    Ok(EnsembleScore {
        probability: combine(&bundle.ensemble_weights, &components),
        confidence: confidence(&values),
        source: ScoreSource::Model,
        components,
    })
}

/// Score against the live bundle; `Untrained` when none is loaded
pub fn score_live(bundle: Option<&ModelBundle>, features: &[f64]) -> Result<EnsembleScore> {
    match bundle {
        Some(bundle) => score(bundle, features),
        None => Err(EngineError::Untrained),
    }
}

/// Stand-in score when no bundle is loaded
pub fn placeholder_score<R: Rng>(rng: &mut R) -> EnsembleScore {
    EnsembleScore {
        probability: rng.gen_range(0.3..=0.7),
        confidence: rng.gen_range(0.6..=0.8),
        source: ScoreSource::Placeholder,
        components: BTreeMap::new(),
    }
}

/// Points by which the home side is favoured
pub fn spread(probability: f64, scale: f64) -> f64 {
    (probability - 0.5) * scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equal_probabilities_give_full_confidence() {
        for p in [0.0, 0.1, 0.3, 0.5, 0.77, 1.0] {
            assert_eq!(confidence(&[p, p, p]), 1.0);
        }
    }

    #[test]
    fn disagreement_lowers_confidence() {
        let c = confidence(&[0.6, 0.5, 0.4]);
        let sigma = (2.0f64 / 300.0).sqrt();
        assert!((c - (1.0 - 2.0 * sigma)).abs() < 1e-12);
        assert_eq!(confidence(&[0.0, 1.0, 0.0]), 0.5);
    }

    #[test]
    fn spread_is_zero_at_even_odds() {
        assert_eq!(spread(0.5, 20.0), 0.0);
        assert!((spread(0.75, 20.0) - 5.0).abs() < 1e-12);
        assert!(spread(0.25, 20.0) < 0.0);
    }

    #[test]
    fn combine_applies_weights() {
        let weights = crate::types::default_ensemble_weights();
        let probs = BTreeMap::from([
            (ModelKind::BoostedTrees, 0.8),
            (ModelKind::Logistic, 0.6),
            (ModelKind::RandomForest, 0.4),
        ]);
        assert!((combine(&weights, &probs) - 0.66).abs() < 1e-12);
    }

    #[test]
    fn missing_bundle_is_untrained() {
        assert!(matches!(
            score_live(None, &[0.0; 25]),
            Err(EngineError::Untrained)
        ));
    }

    #[test]
    fn placeholder_is_labelled() {
        let mut rng = rand::thread_rng();
        let s = placeholder_score(&mut rng);
        assert_eq!(s.source, ScoreSource::Placeholder);
        assert!((0.3..=0.7).contains(&s.probability));
        assert!((0.6..=0.8).contains(&s.confidence));
    }

    proptest! {
        #[test]
        fn confidence_is_bounded(a in 0.0f64..=1.0, b in 0.0f64..=1.0, c in 0.0f64..=1.0) {
            let conf = confidence(&[a, b, c]);
            prop_assert!((0.5..=1.0).contains(&conf));
        }
    }
}
