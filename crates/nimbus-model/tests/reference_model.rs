//! The bundled reference model served through the file registry

use nimbus_core::PredictionRecord;
use nimbus_model::{FileModelRegistry, LinearClassifier, LoaderConfig, ModelLoader};
use std::sync::Arc;

fn reference_loader() -> ModelLoader {
    let index = concat!(env!("CARGO_MANIFEST_DIR"), "/../../models/registry.yaml");
    ModelLoader::new(
        Arc::new(FileModelRegistry::new(index)),
        LoaderConfig::new("nimbus-classifier", "production"),
    )
}

#[tokio::test]
async fn test_setosa_scenario() {
    let loader = reference_loader();
    let handle = loader.get_model().await.unwrap();

    let prediction = handle
        .predict_one(&PredictionRecord::new(5.1, 3.5, 1.4, 0.2))
        .unwrap();

    assert_eq!(prediction, 0);
    assert_eq!(handle.info().version, "1");
}

#[tokio::test]
async fn test_labels_stay_within_three_classes() {
    let loader = reference_loader();
    let handle = loader.get_model().await.unwrap();

    let records: Vec<PredictionRecord> = [
        (4.9, 3.0, 1.4, 0.2),
        (5.0, 3.6, 1.4, 0.2),
        (6.4, 3.2, 4.5, 1.5),
        (5.5, 2.3, 4.0, 1.3),
        (6.5, 3.0, 5.8, 2.2),
        (7.7, 3.8, 6.7, 2.2),
        (0.0, 0.0, 0.0, 0.0),
        (100.0, -50.0, 3.0, 1.0),
    ]
    .iter()
    .map(|&(a, b, c, d)| PredictionRecord::new(a, b, c, d))
    .collect();

    let predictions = handle.predict(&records).unwrap();
    assert_eq!(predictions.len(), records.len());
    assert!(predictions.iter().all(|p| (0..=2).contains(p)));
    assert_eq!(&predictions[..6], &[0, 0, 1, 1, 2, 2]);
}

#[test]
fn test_artifact_matches_export_layout() {
    let path = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../models/nimbus-classifier/1/linear_model.json"
    );
    let model = LinearClassifier::from_json(&std::fs::read(path).unwrap()).unwrap();

    assert_eq!(model.classes, vec![0, 1, 2]);
    assert_eq!(model.coefficients.len(), 3);
    assert!(model
        .coefficients
        .iter()
        .all(|row| row.len() == PredictionRecord::NUM_FEATURES));
    assert_eq!(model.intercepts.len(), 3);
    assert_eq!(model.feature_names, PredictionRecord::FEATURE_NAMES);

    // Multinomial fit with an L2 penalty: parameters are zero-mean across classes
    for feature in 0..PredictionRecord::NUM_FEATURES {
        let column: f64 = model.coefficients.iter().map(|row| row[feature]).sum();
        assert!(column.abs() < 1e-3, "feature {feature} sums to {column}");
    }
    let intercepts: f64 = model.intercepts.iter().sum();
    assert!(intercepts.abs() < 1e-3);
}
