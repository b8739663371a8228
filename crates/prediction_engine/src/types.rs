//! Request and result types shared by the engine and the HTTP layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ensemble member identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    BoostedTrees,
    Logistic,
    RandomForest,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::BoostedTrees,
        ModelKind::Logistic,
        ModelKind::RandomForest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::BoostedTrees => "boosted_trees",
            ModelKind::Logistic => "logistic",
            ModelKind::RandomForest => "random_forest",
        }
    }

    /// Artifact file name inside a bundle directory
    pub fn artifact_name(&self) -> &'static str {
        match self {
            ModelKind::BoostedTrees => "boosted_trees.bin",
            ModelKind::Logistic => "logistic.bin",
            ModelKind::RandomForest => "random_forest.bin",
        }
    }
}

/// Fixed ensemble weights used when a bundle is trained
pub fn default_ensemble_weights() -> BTreeMap<ModelKind, f64> {
    BTreeMap::from([
        (ModelKind::BoostedTrees, 0.5),
        (ModelKind::Logistic, 0.3),
        (ModelKind::RandomForest, 0.2),
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    WinProbability,
    Spread,
    TotalPoints,
}

/// Whether a number came from the trained models or was synthesised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Model,
    Placeholder,
}

/// Per-kind prediction payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionPayload {
    WinProbability {
        probability: f64,
        confidence: f64,
        source: ScoreSource,
    },
    Spread {
        spread: f64,
        confidence: f64,
        source: ScoreSource,
    },
    TotalPoints {
        total: f64,
        confidence: f64,
        source: ScoreSource,
    },
}

impl PredictionPayload {
    pub fn confidence(&self) -> f64 {
        match self {
            PredictionPayload::WinProbability { confidence, .. }
            | PredictionPayload::Spread { confidence, .. }
            | PredictionPayload::TotalPoints { confidence, .. } => *confidence,
        }
    }

    pub fn source(&self) -> ScoreSource {
        match self {
            PredictionPayload::WinProbability { source, .. }
            | PredictionPayload::Spread { source, .. }
            | PredictionPayload::TotalPoints { source, .. } => *source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub main_factors: Vec<String>,
    #[serde(default)]
    pub supporting_factors: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    pub confidence_reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub version: String,
    pub last_trained: Option<DateTime<Utc>>,
    pub ensemble_weights: BTreeMap<ModelKind, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub game_id: String,
    pub predictions: BTreeMap<PredictionKind, PredictionPayload>,
    pub explanation: Option<Explanation>,
    pub model_info: ModelInfo,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl PredictionResult {
    /// Produced by demo mode rather than a trained bundle
    pub fn is_demo(&self) -> bool {
        self.model_info.version.starts_with("demo-")
    }

    pub fn win_probability(&self) -> Option<f64> {
        match self.predictions.get(&PredictionKind::WinProbability) {
            Some(PredictionPayload::WinProbability { probability, .. }) => Some(*probability),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
    pub rank: usize,
}

/// Validation-set evaluation of the weighted ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub accuracy: f64,
    pub log_loss: f64,
    pub auc_roc: f64,
    /// 1 - Brier score
    pub calibration_score: f64,
    pub feature_importance: Vec<FeatureImportance>,
    pub training_samples: usize,
    pub last_trained: Option<DateTime<Utc>>,
    pub model_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub feature_names: Vec<String>,
    pub feature_importance: Vec<FeatureImportance>,
    pub feature_descriptions: BTreeMap<String, String>,
    pub total_features: usize,
}

/// Structured game inputs. Every field has a neutral default so partial
/// payloads (including `{}`) are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameFeatures {
    pub home_team_elo: f64,
    pub away_team_elo: f64,
    pub elo_spread: f64,
    /// Wins in the last five games
    pub home_team_form: f64,
    pub away_team_form: f64,
    pub home_team_rest_days: u32,
    pub away_team_rest_days: u32,
    pub home_team_wins: u32,
    pub home_team_losses: u32,
    pub away_team_wins: u32,
    pub away_team_losses: u32,
    pub home_team_off_rating: Option<f64>,
    pub home_team_def_rating: Option<f64>,
    pub away_team_off_rating: Option<f64>,
    pub away_team_def_rating: Option<f64>,
    pub is_playoff: bool,
    pub is_back_to_back: bool,
    pub venue_advantage: f64,
    /// Fahrenheit
    pub temperature: Option<f64>,
    /// mph
    pub wind_speed: Option<f64>,
    pub precipitation: bool,
    /// 0 (no impact) to 1
    pub home_team_injury_impact: f64,
    pub away_team_injury_impact: f64,
}

impl Default for GameFeatures {
    fn default() -> Self {
        Self {
            home_team_elo: 1500.0,
            away_team_elo: 1500.0,
            elo_spread: 0.0,
            home_team_form: 0.0,
            away_team_form: 0.0,
            home_team_rest_days: 1,
            away_team_rest_days: 1,
            home_team_wins: 0,
            home_team_losses: 0,
            away_team_wins: 0,
            away_team_losses: 0,
            home_team_off_rating: None,
            home_team_def_rating: None,
            away_team_off_rating: None,
            away_team_def_rating: None,
            is_playoff: false,
            is_back_to_back: false,
            venue_advantage: 0.0,
            temperature: None,
            wind_speed: None,
            precipitation: false,
            home_team_injury_impact: 0.0,
            away_team_injury_impact: 0.0,
        }
    }
}

fn default_prediction_types() -> Vec<PredictionKind> {
    vec![PredictionKind::WinProbability]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub game_id: String,
    #[serde(default)]
    pub features: Option<GameFeatures>,
    #[serde(default = "default_prediction_types")]
    pub prediction_types: Vec<PredictionKind>,
    #[serde(default = "default_true")]
    pub include_explanation: bool,
}

impl PredictionRequest {
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            features: None,
            prediction_types: default_prediction_types(),
            include_explanation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPredictionRequest {
    pub game_requests: Vec<PredictionRequest>,
    #[serde(default)]
    pub max_concurrent: Option<usize>,
}

/// One batch slot: the result, plus the failure that forced a demo result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    #[serde(flatten)]
    pub result: PredictionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPredictionResponse {
    pub predictions: Vec<BatchEntry>,
    pub total_games: usize,
    /// Entries that did not fall back to a demo result
    pub successful_predictions: usize,
    pub batch_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_keys: usize,
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    pub prediction_cache_size: usize,
    pub last_cleared: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub model_version: Option<String>,
    pub services: BTreeMap<String, String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_valid_game_features() {
        let features: GameFeatures = serde_json::from_str("{}").unwrap();
        assert_eq!(features, GameFeatures::default());
    }

    #[test]
    fn request_defaults() {
        let req: PredictionRequest = serde_json::from_str(r#"{"game_id":"g1"}"#).unwrap();
        assert_eq!(req.prediction_types, vec![PredictionKind::WinProbability]);
        assert!(req.include_explanation);
        assert!(req.features.is_none());
    }

    #[test]
    fn payloads_round_trip_through_kind_map() {
        let mut predictions = BTreeMap::new();
        predictions.insert(
            PredictionKind::Spread,
            PredictionPayload::Spread {
                spread: -2.5,
                confidence: 0.7,
                source: ScoreSource::Model,
            },
        );
        predictions.insert(
            PredictionKind::TotalPoints,
            PredictionPayload::TotalPoints {
                total: 221.0,
                confidence: 0.65,
                source: ScoreSource::Placeholder,
            },
        );

        let json = serde_json::to_value(&predictions).unwrap();
        assert_eq!(json["spread"]["spread"], -2.5);
        assert_eq!(json["total_points"]["source"], "placeholder");

        let back: BTreeMap<PredictionKind, PredictionPayload> = serde_json::from_value(json).unwrap();
        assert_eq!(back, predictions);
    }

    #[test]
    fn weights_serialize_with_model_names() {
        let json = serde_json::to_value(default_ensemble_weights()).unwrap();
        assert_eq!(json["boosted_trees"], 0.5);
        assert_eq!(json["logistic"], 0.3);
        assert_eq!(json["random_forest"], 0.2);
    }
}
