//! Explanation text built from the ranked feature importance

use crate::types::{Explanation, FeatureImportance};

const MAIN_FACTORS: usize = 3;
const SUPPORTING_FACTORS: usize = 3;

/// Rank features by importance magnitude, descending. Ties keep feature order.
pub fn rank_features(names: &[String], importances: &[f64]) -> Vec<FeatureImportance> {
    let mut indexed: Vec<(usize, f64)> = importances.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

    indexed
        .into_iter()
        .filter_map(|(idx, importance)| names.get(idx).map(|name| (name, importance)))
        .enumerate()
        .map(|(rank, (name, importance))| FeatureImportance {
            feature: name.clone(),
            importance,
            rank: rank + 1,
        })
        .collect()
}

/// Top three features become main factors and ranks four to six supporting
/// factors. Fewer than three ranked features gives the generic explanation.
pub fn build_explanation(ranked: &[FeatureImportance]) -> Explanation {
    if ranked.len() < MAIN_FACTORS {
        return generic_explanation();
    }

    let describe = |f: &FeatureImportance| format!("{}: {:.2}", f.feature, f.importance);

    Explanation {
        main_factors: ranked.iter().take(MAIN_FACTORS).map(describe).collect(),
        supporting_factors: ranked
            .iter()
            .skip(MAIN_FACTORS)
            .take(SUPPORTING_FACTORS)
            .map(describe)
            .collect(),
        risk_factors: vec![
            "Model uncertainty".to_string(),
            "Limited recent data".to_string(),
        ],
        confidence_reasoning: "Based on ensemble model agreement and historical accuracy"
            .to_string(),
    }
}

pub fn generic_explanation() -> Explanation {
    Explanation {
        main_factors: vec![
            "Team performance analysis".to_string(),
            "Historical matchup data".to_string(),
        ],
        supporting_factors: vec![
            "Recent player performance".to_string(),
            "Home/away records".to_string(),
        ],
        risk_factors: vec!["Injury reports".to_string(), "Weather conditions".to_string()],
        confidence_reasoning: "Based on available data and model performance".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    #[test]
    fn ranking_breaks_ties_by_feature_order() {
        let ranked = rank_features(&names(4), &[0.1, 0.4, 0.4, -0.5]);
        let order: Vec<&str> = ranked.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(order, vec!["f3", "f1", "f2", "f0"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[3].rank, 4);
    }

    #[test]
    fn explanation_uses_top_features() {
        let ranked = rank_features(&names(8), &[0.05, 0.3, 0.2, 0.1, 0.15, 0.08, 0.07, 0.05]);
        let explanation = build_explanation(&ranked);

        assert_eq!(
            explanation.main_factors,
            vec!["f1: 0.30", "f2: 0.20", "f4: 0.15"]
        );
        assert_eq!(
            explanation.supporting_factors,
            vec!["f3: 0.10", "f5: 0.08", "f6: 0.07"]
        );
        assert_eq!(explanation.risk_factors.len(), 2);
    }

    #[test]
    fn short_ranking_gives_generic_factors() {
        let ranked = rank_features(&names(2), &[0.6, 0.4]);
        assert_eq!(build_explanation(&ranked), generic_explanation());
    }
}
