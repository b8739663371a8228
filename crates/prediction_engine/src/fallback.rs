//! Demo mode: labelled low-confidence results used when no trained bundle
//! exists or a prediction step fails

use chrono::Utc;
use rand::Rng;
use std::collections::BTreeMap;

use crate::types::{
    Explanation, ModelInfo, PerformanceMetrics, PredictionKind, PredictionPayload,
    PredictionResult, ScoreSource,
};

pub const DEMO_VERSION: &str = "demo-1.0.0";
pub const DEMO_TRAINING_SAMPLES: usize = 5000;

/// Never touches the store or the feature builder
pub fn demo_predict(game_id: &str) -> PredictionResult {
    let mut rng = rand::thread_rng();
    let probability = rng.gen_range(0.35..=0.65);
    let confidence = rng.gen_range(0.6..=0.85);

    tracing::info!(game_id, "Generating demo prediction");

    PredictionResult {
        game_id: game_id.to_string(),
        predictions: BTreeMap::from([(
            PredictionKind::WinProbability,
            PredictionPayload::WinProbability {
                probability,
                confidence,
                source: ScoreSource::Placeholder,
            },
        )]),
        explanation: Some(demo_explanation()),
        model_info: demo_model_info(),
        confidence,
        created_at: Utc::now(),
    }
}

pub fn demo_model_info() -> ModelInfo {
    ModelInfo {
        version: DEMO_VERSION.to_string(),
        last_trained: None,
        ensemble_weights: BTreeMap::new(),
    }
}

pub fn demo_explanation() -> Explanation {
    Explanation {
        main_factors: vec![
            "Demo mode - statistical analysis".to_string(),
            "Team performance metrics".to_string(),
        ],
        supporting_factors: vec![
            "Recent game outcomes".to_string(),
            "Player availability".to_string(),
        ],
        risk_factors: vec!["Limited data in demo mode".to_string()],
        confidence_reasoning: "Demo prediction with mock confidence".to_string(),
    }
}

/// Fixed metrics reported while no bundle is loaded
pub fn demo_performance_metrics() -> PerformanceMetrics {
    PerformanceMetrics {
        accuracy: 0.67,
        log_loss: 0.62,
        auc_roc: 0.72,
        calibration_score: 0.68,
        feature_importance: Vec::new(),
        training_samples: DEMO_TRAINING_SAMPLES,
        last_trained: None,
        model_version: DEMO_VERSION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_prediction_is_labelled_and_bounded() {
        for _ in 0..50 {
            let result = demo_predict("g1");
            assert!(result.is_demo());
            assert!(result.model_info.ensemble_weights.is_empty());
            assert!(result.model_info.last_trained.is_none());

            let p = result.win_probability().unwrap();
            assert!((0.35..=0.65).contains(&p));
            assert!((0.6..=0.85).contains(&result.confidence));
        }
    }
}
