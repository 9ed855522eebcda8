//! Pipeline configuration loaded from TOML.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use shared_logging::LogLevel;
use tweetsense_text::DEFAULT_MAX_FEATURES;

use crate::{classifier::SolverConfig, dataset::Columns, error::DataError};

/// Whole-pipeline settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Dataset locations and split.
    #[serde(default)]
    pub data: DataConfig,
    /// Vectorizer settings.
    #[serde(default)]
    pub features: FeatureConfig,
    /// Solver settings.
    #[serde(default)]
    pub model: SolverConfig,
    /// Artifact store location.
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    /// Serving settings.
    #[serde(default)]
    pub serving: ServingConfig,
    /// Structured log settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Dataset files and split parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Raw labelled CSV.
    pub raw_csv: PathBuf,
    /// Training split output.
    pub train_csv: PathBuf,
    /// Test split output.
    pub test_csv: PathBuf,
    /// Text column name.
    pub text_column: String,
    /// Label column name.
    pub label_column: String,
    /// Test fraction, strictly between 0 and 1.
    pub test_size: f64,
    /// Shuffle seed.
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_csv: PathBuf::from("data/raw/tweet_emotions.csv"),
            train_csv: PathBuf::from("data/processed/train.csv"),
            test_csv: PathBuf::from("data/processed/test.csv"),
            text_column: "content".into(),
            label_column: "sentiment".into(),
            test_size: 0.2,
            seed: 42,
        }
    }
}

impl DataConfig {
    /// Column names as used by the CSV reader.
    #[must_use]
    pub fn columns(&self) -> Columns {
        Columns {
            text: self.text_column.clone(),
            label: self.label_column.clone(),
        }
    }
}

/// Vectorizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Vocabulary size cap.
    pub max_features: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
        }
    }
}

/// Artifact store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Store directory.
    pub dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
        }
    }
}

/// Serving settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingConfig {
    /// Prediction audit log.
    pub audit_log: PathBuf,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            audit_log: PathBuf::from("logs/predictions.log"),
        }
    }
}

/// Structured log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// JSON-lines log file.
    pub path: PathBuf,
    /// Minimum level name.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs/tweetsense.jsonl"),
            level: "info".into(),
        }
    }
}

impl LoggingConfig {
    /// Parsed minimum level.
    pub fn min_level(&self) -> Result<LogLevel, DataError> {
        self.level
            .parse()
            .map_err(|_| DataError::InvalidConfig(format!("unknown log level {:?}", self.level)))
    }
}

impl PipelineConfig {
    /// Reads, validates and path-resolves a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| DataError::io(path, err))?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_toml_str(&raw, &base)
    }

    /// Parses TOML text, resolving relative paths against `base`.
    pub fn from_toml_str(raw: &str, base: &Path) -> Result<Self, DataError> {
        let mut config: Self = toml::from_str(raw)
            .map_err(|err| DataError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        config.resolve_paths(base);
        Ok(config)
    }

    /// Rejects out-of-range values.
    pub fn validate(&self) -> Result<(), DataError> {
        if !(self.data.test_size > 0.0 && self.data.test_size < 1.0) {
            return Err(DataError::InvalidConfig(format!(
                "data.test_size must lie strictly between 0 and 1, got {}",
                self.data.test_size
            )));
        }
        if self.data.text_column.trim().is_empty() || self.data.label_column.trim().is_empty() {
            return Err(DataError::InvalidConfig("column names must not be empty".into()));
        }
        if self.features.max_features == 0 {
            return Err(DataError::InvalidConfig("features.max_features must be >= 1".into()));
        }
        self.model
            .validate()
            .map_err(|err| DataError::InvalidConfig(format!("model: {err}")))?;
        self.logging.min_level()?;
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.data.raw_csv,
            &mut self.data.train_csv,
            &mut self.data.test_csv,
            &mut self.artifacts.dir,
            &mut self.serving.audit_log,
            &mut self.logging.path,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_uses_defaults() {
        let config = PipelineConfig::from_toml_str("", Path::new("/srv")).unwrap();
        assert_eq!(config.features.max_features, 5000);
        assert_eq!(config.model, SolverConfig::default());
        assert_eq!(config.data.seed, 42);
        assert_eq!(config.artifacts.dir, PathBuf::from("/srv/models"));
        assert_eq!(config.logging.min_level().unwrap(), LogLevel::Info);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let raw = r#"
            [model]
            c = 0.5

            [data]
            test_size = 0.25
            raw_csv = "/abs/raw.csv"
        "#;
        let config = PipelineConfig::from_toml_str(raw, Path::new("cfg")).unwrap();
        assert!((config.model.c - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.model.max_iter, 500);
        assert_eq!(config.data.raw_csv, PathBuf::from("/abs/raw.csv"));
        assert_eq!(config.data.train_csv, Path::new("cfg").join("data/processed/train.csv"));
        assert_eq!(config.data.columns(), Columns::default());
    }

    #[test]
    fn rejects_invalid_values() {
        for raw in [
            "[data]\ntest_size = 1.0",
            "[features]\nmax_features = 0",
            "[model]\nc = 0.0",
            "[logging]\nlevel = \"loud\"",
            "[data\n",
        ] {
            assert!(
                matches!(
                    PipelineConfig::from_toml_str(raw, Path::new(".")),
                    Err(DataError::InvalidConfig(_))
                ),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn load_resolves_against_file_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, "[artifacts]\ndir = \"out/models\"\n").unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.artifacts.dir, dir.path().join("out/models"));
        assert!(matches!(
            PipelineConfig::load(dir.path().join("missing.toml")),
            Err(DataError::Io { .. })
        ));
    }
}
