#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Learning side of the tweet sentiment pipeline: dataset ingestion and
//! splitting, the logistic-regression classifier, evaluation metrics, the
//! versioned artifact store and the training driver tying them together.

/// Bundle and store for trained artifacts.
pub mod artifact;
/// Multinomial logistic regression.
pub mod classifier;
/// TOML pipeline configuration.
pub mod config;
/// Records, labels, CSV ingestion and splitting.
pub mod dataset;
/// Typed errors.
pub mod error;
/// Classification report.
pub mod metrics;
/// Training state machine.
pub mod pipeline;

pub use artifact::{ArtifactBundle, ArtifactStore};
pub use classifier::{FitSummary, LogisticModel, SolverConfig};
pub use config::PipelineConfig;
pub use dataset::{CleanedRecord, Columns, LabelEncoder, RawRecord, Sentiment};
pub use error::{ArtifactError, DataError, ModelError, TrainingError};
pub use metrics::{ClassMetrics, ClassificationReport};
pub use pipeline::{
    evaluate, prepare_splits, SplitReport, TrainingDriver, TrainingOutcome, TrainingStage,
};
