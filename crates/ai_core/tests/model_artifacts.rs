//! Artifact encoding and inference across all three classifiers

use matchday_ai_core::serialization::{decode, digest_hex, encode};
use matchday_ai_core::{
    BoostedTreesModel, CalibratedLogistic, Classifier, LogisticModel, ModelError, Node,
    PlattCalibrator, RandomForestModel, StandardScaler, Tree,
};

fn stump(feature: i32, threshold: f64, left: f64, right: f64, weight: f64) -> Tree {
    Tree::new(
        vec![
            Node::internal(0, feature, threshold, 1, 2),
            Node::leaf(1, left),
            Node::leaf(2, right),
        ],
        weight,
    )
}

fn boosted() -> BoostedTreesModel {
    BoostedTreesModel::new(
        3,
        -0.2,
        vec![stump(0, 0.0, -0.8, 0.9, 0.1), stump(2, 1.5, 0.3, -0.4, 0.1)],
        vec![0.7, 0.0, 0.3],
    )
}

#[test]
fn test_decoded_models_predict_identically() {
    let forest = RandomForestModel::new(
        3,
        vec![stump(1, 0.5, 0.2, 0.9, 1.0), stump(0, -1.0, 0.4, 0.6, 1.0)],
    );
    let logistic = CalibratedLogistic::new(
        LogisticModel::new(vec![0.5, -1.2, 0.05], 0.3),
        PlattCalibrator::new(-1.4, 0.1),
    );
    let probe = [0.3, 0.7, 2.0];

    let boosted_back: BoostedTreesModel = decode(&encode(&boosted()).unwrap()).unwrap();
    let forest_back: RandomForestModel = decode(&encode(&forest).unwrap()).unwrap();
    let logistic_back: CalibratedLogistic = decode(&encode(&logistic).unwrap()).unwrap();

    assert_eq!(
        boosted().predict_proba(&probe).unwrap(),
        boosted_back.predict_proba(&probe).unwrap()
    );
    assert_eq!(
        forest.predict_proba(&probe).unwrap(),
        forest_back.predict_proba(&probe).unwrap()
    );
    assert_eq!(
        logistic.predict_proba(&probe).unwrap(),
        logistic_back.predict_proba(&probe).unwrap()
    );
}

#[test]
fn test_digest_tracks_model_changes() {
    let a = encode(&boosted()).unwrap();
    let mut changed = boosted();
    changed.base_score = 0.0;
    let b = encode(&changed).unwrap();

    assert_eq!(digest_hex(&a), digest_hex(&encode(&boosted()).unwrap()));
    assert_ne!(digest_hex(&a), digest_hex(&b));
}

#[test]
fn test_width_and_finiteness_checked_before_inference() {
    let model = boosted();
    assert!(matches!(
        model.predict_proba(&[1.0, 2.0]),
        Err(ModelError::FeatureCountMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert!(matches!(
        model.predict_proba(&[1.0, f64::NAN, 0.0]),
        Err(ModelError::InvalidInput(_))
    ));
}

#[test]
fn test_scaler_feeds_logistic_scaled_rows() {
    let rows = vec![
        vec![1500.0, 0.0],
        vec![1600.0, 2.0],
        vec![1400.0, 4.0],
    ];
    let scaler = StandardScaler::fit(&rows).unwrap();
    let scaled = scaler.transform(&[1500.0, 2.0]).unwrap();
    assert!(scaled.iter().all(|v| v.abs() < 1e-12));

    let logistic = CalibratedLogistic::new(
        LogisticModel::new(vec![1.0, 1.0], 0.0),
        PlattCalibrator::identity(),
    );
    assert!((logistic.predict_proba(&scaled).unwrap() - 0.5).abs() < 1e-12);
}
