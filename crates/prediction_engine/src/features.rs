//! Feature vector construction
//!
//! A [`FeatureBuilder`] turns either structured [`GameFeatures`] or a bare
//! game id into the fixed-order numeric vector the models were trained on.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::errors::{EngineError, Result};
use crate::types::GameFeatures;

pub type FeatureVector = Vec<f64>;

/// League-average stand-in for missing advanced ratings
const DEFAULT_RATING: f64 = 110.0;
/// Indoor conditions stand-in for missing weather
const DEFAULT_TEMPERATURE_F: f64 = 70.0;

/// Feature order and descriptions of the structured builder
pub const FEATURES: [(&str, &str); 25] = [
    ("home_team_elo", "Home team Elo rating"),
    ("away_team_elo", "Away team Elo rating"),
    ("elo_spread", "Difference in Elo ratings"),
    ("home_team_form", "Home team wins in last 5 games"),
    ("away_team_form", "Away team wins in last 5 games"),
    ("home_team_rest_days", "Days since home team's last game"),
    ("away_team_rest_days", "Days since away team's last game"),
    ("home_team_wins", "Home team season wins"),
    ("home_team_losses", "Home team season losses"),
    ("away_team_wins", "Away team season wins"),
    ("away_team_losses", "Away team season losses"),
    ("home_team_win_pct", "Home team season win percentage"),
    ("away_team_win_pct", "Away team season win percentage"),
    ("home_team_off_rating", "Home team offensive rating"),
    ("home_team_def_rating", "Home team defensive rating"),
    ("away_team_off_rating", "Away team offensive rating"),
    ("away_team_def_rating", "Away team defensive rating"),
    ("is_playoff", "Is playoff game"),
    ("is_back_to_back", "Is back-to-back game for either team"),
    ("venue_advantage", "Home venue advantage factor"),
    ("temperature", "Temperature in Fahrenheit"),
    ("wind_speed", "Wind speed in mph"),
    ("precipitation", "Is precipitation expected"),
    ("home_team_injury_impact", "Home injury impact factor (0-1)"),
    ("away_team_injury_impact", "Away injury impact factor (0-1)"),
];

#[async_trait]
pub trait FeatureBuilder: Send + Sync {
    /// Ordered names; the length is the vector width
    fn feature_names(&self) -> Vec<String>;

    /// Human-readable description per feature name
    fn feature_descriptions(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn build_from_features(&self, features: &GameFeatures) -> FeatureVector;

    async fn build_from_game_id(&self, game_id: &str) -> Result<FeatureVector>;
}

/// Looks up the structured inputs for a scheduled game
#[async_trait]
pub trait GameDataSource: Send + Sync {
    async fn fetch(&self, game_id: &str) -> Result<GameFeatures>;
}

/// In-memory game table
#[derive(Debug, Default)]
pub struct StaticGameData {
    games: RwLock<HashMap<String, GameFeatures>>,
}

impl StaticGameData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON object mapping game ids to their features
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let games: HashMap<String, GameFeatures> =
            serde_json::from_str(&std::fs::read_to_string(path)?)?;
        tracing::info!(path = %path.display(), games = games.len(), "Loaded game data");
        Ok(Self {
            games: RwLock::new(games),
        })
    }

    pub fn insert(&self, game_id: impl Into<String>, features: GameFeatures) {
        self.games.write().insert(game_id.into(), features);
    }

    pub fn len(&self) -> usize {
        self.games.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.read().is_empty()
    }
}

#[async_trait]
impl GameDataSource for StaticGameData {
    async fn fetch(&self, game_id: &str) -> Result<GameFeatures> {
        self.games
            .read()
            .get(game_id)
            .cloned()
            .ok_or_else(|| EngineError::FeatureUnavailable {
                game_id: game_id.to_string(),
                reason: "no game data".to_string(),
            })
    }
}

/// Builds the 25-wide vector described by [`FEATURES`]
pub struct StructuredFeatureBuilder {
    source: Arc<dyn GameDataSource>,
}

impl StructuredFeatureBuilder {
    pub fn new(source: Arc<dyn GameDataSource>) -> Self {
        Self { source }
    }

    pub fn width() -> usize {
        FEATURES.len()
    }
}

fn win_pct(wins: u32, losses: u32) -> f64 {
    let games = wins as f64 + losses as f64;
    if games == 0.0 {
        0.5
    } else {
        wins as f64 / games
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[async_trait]
impl FeatureBuilder for StructuredFeatureBuilder {
    fn feature_names(&self) -> Vec<String> {
        FEATURES.iter().map(|(name, _)| name.to_string()).collect()
    }

    fn feature_descriptions(&self) -> BTreeMap<String, String> {
        FEATURES
            .iter()
            .map(|(name, desc)| (name.to_string(), desc.to_string()))
            .collect()
    }

    fn build_from_features(&self, f: &GameFeatures) -> FeatureVector {
        vec![
            f.home_team_elo,
            f.away_team_elo,
            f.elo_spread,
            f.home_team_form,
            f.away_team_form,
            f.home_team_rest_days as f64,
            f.away_team_rest_days as f64,
            f.home_team_wins as f64,
            f.home_team_losses as f64,
            f.away_team_wins as f64,
            f.away_team_losses as f64,
            win_pct(f.home_team_wins, f.home_team_losses),
            win_pct(f.away_team_wins, f.away_team_losses),
            f.home_team_off_rating.unwrap_or(DEFAULT_RATING),
            f.home_team_def_rating.unwrap_or(DEFAULT_RATING),
            f.away_team_off_rating.unwrap_or(DEFAULT_RATING),
            f.away_team_def_rating.unwrap_or(DEFAULT_RATING),
            flag(f.is_playoff),
            flag(f.is_back_to_back),
            f.venue_advantage,
            f.temperature.unwrap_or(DEFAULT_TEMPERATURE_F),
            f.wind_speed.unwrap_or(0.0),
            flag(f.precipitation),
            f.home_team_injury_impact,
            f.away_team_injury_impact,
        ]
    }

    async fn build_from_game_id(&self, game_id: &str) -> Result<FeatureVector> {
        let features = self.source.fetch(game_id).await?;
        Ok(self.build_from_features(&features))
    }
}
