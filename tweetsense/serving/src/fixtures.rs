use std::path::Path;

use serde_json::{json, Value};
use tweetsense_learning::{ArtifactBundle, ArtifactStore, RawRecord, Sentiment, SolverConfig, TrainingDriver};

fn corpus() -> Vec<RawRecord> {
    vec![
        RawRecord::new("love sunny beach", Sentiment::Happiness),
        RawRecord::new("happy sunny fun", Sentiment::Happiness),
        RawRecord::new("sad rainy night", Sentiment::Sadness),
        RawRecord::new("cry lonely night", Sentiment::Sadness),
        RawRecord::new("office meeting schedule", Sentiment::Neutral),
        RawRecord::new("commute office train", Sentiment::Neutral),
    ]
}

pub fn trained_store(dir: &Path) -> ArtifactStore {
    let store = ArtifactStore::new(dir.join("models"));
    TrainingDriver::new(store.clone(), 100, SolverConfig::default())
        .run(corpus())
        .unwrap();
    store
}

pub fn retrain_with_extra(store: &ArtifactStore) -> String {
    let mut records = corpus();
    records.push(RawRecord::new("grey quiet afternoon", Sentiment::Neutral));
    TrainingDriver::new(store.clone(), 100, SolverConfig::default())
        .run(records)
        .unwrap()
        .bundle
        .version()
        .to_owned()
}

fn edit(bundle: &ArtifactBundle, apply: impl FnOnce(&mut Value)) -> ArtifactBundle {
    let mut value = serde_json::to_value(bundle).unwrap();
    apply(&mut value);
    serde_json::from_value(value).unwrap()
}

/// Same bundle with every weight row cut to one entry.
pub fn truncated_weights(bundle: &ArtifactBundle) -> ArtifactBundle {
    edit(bundle, |value| {
        for row in value["model"]["weights"].as_array_mut().unwrap() {
            row.as_array_mut().unwrap().truncate(1);
        }
    })
}

/// Same bundle with a model expecting one more feature than the vocabulary has.
pub fn widened_model(bundle: &ArtifactBundle) -> ArtifactBundle {
    edit(bundle, |value| {
        let model = &mut value["model"];
        let width = model["n_features"].as_u64().unwrap() + 1;
        model["n_features"] = json!(width);
        for row in model["weights"].as_array_mut().unwrap() {
            row.as_array_mut().unwrap().push(json!(0.0));
        }
    })
}
