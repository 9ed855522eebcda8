//! Training driver: ingest, clean, featurize, fit and persist as one run.

use std::{fmt, path::PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::{LogLevel, Telemetry};
use tweetsense_text::{FeatureVector, Vocabulary};

use crate::{
    artifact::{ArtifactBundle, ArtifactStore},
    classifier::{self, FitSummary, SolverConfig},
    config::{DataConfig, PipelineConfig},
    dataset::{self, CleanedRecord, LabelEncoder, RawRecord},
    error::{DataError, ModelError, TrainingError},
    metrics::ClassificationReport,
};

/// Progress of a training run. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStage {
    /// Nothing done yet.
    Pending,
    /// Records are in memory.
    Ingested,
    /// Texts normalized.
    Cleaned,
    /// Vocabulary fitted and texts vectorized.
    Featurized,
    /// Classifier fitted.
    Trained,
    /// Bundle written and promoted.
    Persisted,
}

impl TrainingStage {
    /// Lowercase stage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ingested => "ingested",
            Self::Cleaned => "cleaned",
            Self::Featurized => "featurized",
            Self::Trained => "trained",
            Self::Persisted => "persisted",
        }
    }
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Persisted bundle.
    pub bundle: ArtifactBundle,
    /// Bundle file.
    pub path: PathBuf,
    /// Final stage (always [`TrainingStage::Persisted`]).
    pub stage: TrainingStage,
    /// Solver convergence details.
    pub fit: FitSummary,
    /// Scores on the training records themselves.
    pub train_report: ClassificationReport,
}

/// Result of splitting the raw dataset into train and test files.
#[derive(Debug, Clone, Serialize)]
pub struct SplitReport {
    /// Data rows in the raw file.
    pub rows: usize,
    /// Rows dropped per unsupported label.
    pub skipped: IndexMap<String, usize>,
    /// Records written to the training file.
    pub train: usize,
    /// Records written to the test file.
    pub test: usize,
}

/// Runs one training job against an artifact store.
#[derive(Debug)]
pub struct TrainingDriver {
    store: ArtifactStore,
    max_features: usize,
    solver: SolverConfig,
    telemetry: Telemetry,
    stage: TrainingStage,
}

impl TrainingDriver {
    /// Creates a driver with logging disabled.
    #[must_use]
    pub fn new(store: ArtifactStore, max_features: usize, solver: SolverConfig) -> Self {
        Self {
            store,
            max_features,
            solver,
            telemetry: Telemetry::disabled(),
            stage: TrainingStage::Pending,
        }
    }

    /// Creates a driver from pipeline settings.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            ArtifactStore::new(&config.artifacts.dir),
            config.features.max_features,
            config.model,
        )
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Last stage reached.
    #[must_use]
    pub const fn stage(&self) -> TrainingStage {
        self.stage
    }

    /// Store the driver publishes to.
    #[must_use]
    pub const fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Loads a labelled CSV and trains on it.
    pub fn run_csv(
        &mut self,
        data: &DataConfig,
    ) -> Result<TrainingOutcome, TrainingError> {
        self.stage = TrainingStage::Pending;
        let report = dataset::load_records(&data.train_csv, &data.columns())
            .map_err(|err| self.data_failure(err))?;
        self.log(
            LogLevel::Info,
            "training_data_loaded",
            json!({
                "path": data.train_csv.display().to_string(),
                "rows": report.rows,
                "kept": report.records.len(),
                "skipped": report.skipped,
            }),
        );
        self.run(report.records)
    }

    /// Trains on in-memory records and promotes the resulting bundle.
    ///
    /// Nothing is promoted unless every stage succeeds.
    pub fn run(&mut self, records: Vec<RawRecord>) -> Result<TrainingOutcome, TrainingError> {
        self.stage = TrainingStage::Pending;
        if records.is_empty() {
            return Err(self.data_failure(DataError::EmptyCorpus));
        }
        self.advance(TrainingStage::Ingested, json!({ "records": records.len() }));

        let cleaned: Vec<CleanedRecord> = records.iter().map(RawRecord::clean).collect();
        let blank = cleaned.iter().filter(|record| record.text.is_empty()).count();
        self.advance(
            TrainingStage::Cleaned,
            json!({ "documents": cleaned.len(), "blank": blank }),
        );

        let encoder = LabelEncoder::default();
        let texts: Vec<&str> = cleaned.iter().map(|record| record.text.as_str()).collect();
        let vocabulary = Vocabulary::fit(&texts, self.max_features);
        if vocabulary.is_empty() {
            return Err(self.data_failure(DataError::EmptyVocabulary {
                documents: cleaned.len(),
            }));
        }
        let features = vocabulary.transform_all(&texts);
        let labels: Vec<usize> = cleaned
            .iter()
            .map(|record| {
                encoder
                    .encode(record.label)
                    .ok_or(ModelError::UnknownLabel(record.label))
            })
            .collect::<Result<_, _>>()
            .map_err(|err| self.model_failure(err))?;
        self.advance(
            TrainingStage::Featurized,
            json!({ "vocabulary": vocabulary.len(), "max_features": self.max_features }),
        );

        let (model, fit) = classifier::train(&features, &labels, encoder.len(), &self.solver)
            .map_err(|err| self.model_failure(err))?;
        let predicted = predict_all(&model, &features).map_err(|err| self.model_failure(err))?;
        let train_report = ClassificationReport::from_predictions(&labels, &predicted, &encoder);
        self.advance(
            TrainingStage::Trained,
            json!({
                "iterations": fit.iterations,
                "final_loss": fit.final_loss,
                "converged": fit.converged,
                "train_accuracy": train_report.accuracy,
            }),
        );

        let bundle = ArtifactBundle::new(encoder, vocabulary, model)
            .and_then(|bundle| self.store.publish(&bundle).map(|path| (bundle, path)));
        let (bundle, path) = match bundle {
            Ok(pair) => pair,
            Err(source) => {
                self.log(
                    LogLevel::Error,
                    "training_failed",
                    json!({ "stage": self.stage, "error": source.to_string() }),
                );
                return Err(TrainingError::Artifact {
                    stage: self.stage,
                    source,
                });
            }
        };
        self.advance(
            TrainingStage::Persisted,
            json!({ "version": bundle.version(), "path": path.display().to_string() }),
        );

        Ok(TrainingOutcome {
            bundle,
            path,
            stage: self.stage,
            fit,
            train_report,
        })
    }

    fn advance(&mut self, next: TrainingStage, metadata: Value) {
        debug_assert!(next > self.stage, "stage {next} after {}", self.stage);
        let mut metadata = metadata;
        if let Value::Object(map) = &mut metadata {
            map.insert("from".into(), json!(self.stage));
            map.insert("to".into(), json!(next));
        }
        self.stage = next;
        self.log(LogLevel::Info, "stage_transition", metadata);
    }

    fn data_failure(&self, source: DataError) -> TrainingError {
        self.log(
            LogLevel::Error,
            "training_failed",
            json!({ "stage": self.stage, "error": source.to_string() }),
        );
        TrainingError::Data {
            stage: self.stage,
            source,
        }
    }

    fn model_failure(&self, source: ModelError) -> TrainingError {
        self.log(
            LogLevel::Error,
            "training_failed",
            json!({ "stage": self.stage, "error": source.to_string() }),
        );
        TrainingError::Model {
            stage: self.stage,
            source,
        }
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        let _ = self.telemetry.log(level, message, metadata);
    }
}

/// Splits the raw dataset into the configured train and test files.
pub fn prepare_splits(data: &DataConfig, telemetry: &Telemetry) -> Result<SplitReport, DataError> {
    let columns = data.columns();
    let ingest = dataset::load_records(&data.raw_csv, &columns)?;
    let (rows, skipped) = (ingest.rows, ingest.skipped);
    let (train, test) = dataset::train_test_split(ingest.records, data.test_size, data.seed)?;
    dataset::write_records(&data.train_csv, &train, &columns)?;
    dataset::write_records(&data.test_csv, &test, &columns)?;
    let report = SplitReport {
        rows,
        skipped,
        train: train.len(),
        test: test.len(),
    };
    let _ = telemetry.log(
        LogLevel::Info,
        "dataset_split",
        json!({
            "raw": data.raw_csv.display().to_string(),
            "rows": report.rows,
            "skipped": report.skipped,
            "train": report.train,
            "test": report.test,
            "seed": data.seed,
        }),
    );
    Ok(report)
}

/// Scores a bundle on labelled records using the bundle's own vocabulary.
pub fn evaluate(
    bundle: &ArtifactBundle,
    records: &[RawRecord],
) -> Result<ClassificationReport, ModelError> {
    let encoder = bundle.classes();
    let mut truth = Vec::with_capacity(records.len());
    let mut features = Vec::with_capacity(records.len());
    for record in records {
        let cleaned = record.clean();
        truth.push(
            encoder
                .encode(cleaned.label)
                .ok_or(ModelError::UnknownLabel(cleaned.label))?,
        );
        features.push(bundle.vocabulary().transform(&cleaned.text));
    }
    let predicted = predict_all(bundle.model(), &features)?;
    Ok(ClassificationReport::from_predictions(&truth, &predicted, encoder))
}

fn predict_all(
    model: &classifier::LogisticModel,
    features: &[FeatureVector],
) -> Result<Vec<usize>, ModelError> {
    features.iter().map(|x| model.predict(x)).collect()
}
