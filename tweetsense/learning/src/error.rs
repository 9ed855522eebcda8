use std::path::PathBuf;

use thiserror::Error;

use crate::{dataset::Sentiment, pipeline::TrainingStage};

/// Malformed or unusable training data and configuration.
#[derive(Debug, Error)]
pub enum DataError {
    /// Filesystem I/O error.
    #[error("io error on {path}: {source}")]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// CSV decoding or encoding failure.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// A required column is absent from the header row.
    #[error("column {column:?} not found in {path}")]
    MissingColumn {
        /// Column name.
        column: String,
        /// CSV file.
        path: PathBuf,
    },
    /// No usable records were ingested.
    #[error("corpus is empty")]
    EmptyCorpus,
    /// Every cleaned document was empty, so no terms could be learned.
    #[error("vocabulary is empty after cleaning {documents} documents")]
    EmptyVocabulary {
        /// Number of documents that were cleaned.
        documents: usize,
    },
    /// The test fraction must lie strictly between 0 and 1.
    #[error("invalid test split fraction {0}")]
    InvalidSplit(f64),
    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Classifier training and inference errors.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    /// Feature vector length differs from the model's input dimensionality.
    #[error("feature dimension mismatch: model expects {expected}, got {got}")]
    DimensionMismatch {
        /// Model input size.
        expected: usize,
        /// Offending vector length.
        got: usize,
    },
    /// Nothing to train on.
    #[error("training set is empty")]
    EmptyTrainingSet,
    /// Features and labels differ in count.
    #[error("{features} feature vectors but {labels} labels")]
    LengthMismatch {
        /// Number of feature vectors.
        features: usize,
        /// Number of labels.
        labels: usize,
    },
    /// A label index is not below the class count.
    #[error("label {label} out of range for {classes} classes")]
    LabelOutOfRange {
        /// Offending label.
        label: usize,
        /// Class count.
        classes: usize,
    },
    /// A solver parameter was rejected.
    #[error("invalid solver parameter: {0}")]
    InvalidParameter(String),
    /// The label encoder has no class index for this sentiment.
    #[error("label {0} has no class index")]
    UnknownLabel(Sentiment),
    /// Weight rows or intercepts disagree with the declared shape.
    #[error("malformed model: {0}")]
    MalformedModel(String),
}

/// Artifact persistence errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Filesystem I/O error.
    #[error("io error on {path}: {source}")]
    Io {
        /// Artifact path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// No bundle has been promoted in the store yet.
    #[error("no current artifact in {0}")]
    NoCurrent(PathBuf),
    /// The bundle does not hash to its recorded version, or its parts disagree.
    #[error("corrupt artifact bundle: {0}")]
    Corrupt(String),
}

impl ArtifactError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Fatal failure of a training run.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// Input data problem.
    #[error("training failed after stage {stage}: {source}")]
    Data {
        /// Last stage completed.
        stage: TrainingStage,
        /// Cause.
        #[source]
        source: DataError,
    },
    /// Solver problem.
    #[error("training failed after stage {stage}: {source}")]
    Model {
        /// Last stage completed.
        stage: TrainingStage,
        /// Cause.
        #[source]
        source: ModelError,
    },
    /// Persistence problem.
    #[error("training failed after stage {stage}: {source}")]
    Artifact {
        /// Last stage completed.
        stage: TrainingStage,
        /// Cause.
        #[source]
        source: ArtifactError,
    },
}

impl TrainingError {
    /// The last stage the run reached before failing.
    #[must_use]
    pub const fn stage(&self) -> TrainingStage {
        match self {
            Self::Data { stage, .. } | Self::Model { stage, .. } | Self::Artifact { stage, .. } => {
                *stage
            }
        }
    }
}
