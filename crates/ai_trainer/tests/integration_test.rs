//! End-to-end fitting on synthetic games

use matchday_ai_core::{metrics, Classifier};
use matchday_ai_trainer::{
    EnsembleTrainer, ForestConfig, GbdtConfig, LogisticConfig, MockTrainingData,
    TrainingDataSource,
};

fn quick_trainer() -> EnsembleTrainer {
    EnsembleTrainer::new(
        GbdtConfig {
            num_trees: 40,
            learning_rate: 0.1,
            ..GbdtConfig::default()
        },
        LogisticConfig {
            max_iter: 300,
            ..LogisticConfig::default()
        },
        ForestConfig {
            num_trees: 20,
            ..ForestConfig::default()
        },
    )
}

#[test]
fn test_members_beat_chance_on_validation() {
    let split = MockTrainingData::new(11).generate(1500, 8).unwrap();
    let fitted = quick_trainer().fit(&split).unwrap();

    let labels = &split.validation.labels;
    let boosted: Vec<f64> = split
        .validation
        .features
        .iter()
        .map(|row| fitted.boosted.predict_proba(row).unwrap())
        .collect();
    let logistic: Vec<f64> = split
        .validation
        .features
        .iter()
        .map(|row| {
            let scaled = fitted.scaler.transform(row).unwrap();
            fitted.logistic.predict_proba(&scaled).unwrap()
        })
        .collect();
    let forest: Vec<f64> = split
        .validation
        .features
        .iter()
        .map(|row| fitted.forest.predict_proba(row).unwrap())
        .collect();

    for probs in [&boosted, &logistic, &forest] {
        let auc = metrics::roc_auc(labels, probs).unwrap();
        assert!(auc > 0.6, "validation AUC {auc} not better than chance");
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}

#[test]
fn test_fitting_is_reproducible() {
    let split = MockTrainingData::new(5).generate(300, 5).unwrap();
    let a = quick_trainer().fit(&split).unwrap();
    let b = quick_trainer().fit(&split).unwrap();

    assert_eq!(a.boosted, b.boosted);
    assert_eq!(a.logistic, b.logistic);
    assert_eq!(a.forest, b.forest);
    assert_eq!(a.scaler, b.scaler);
}
