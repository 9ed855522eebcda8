#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON logging shared by the training and serving crates.
//!
//! Records are written one JSON object per line. [`Telemetry`] wraps a
//! [`JsonLogger`] with a module name and a minimum level so call sites only
//! deal with a message and a metadata payload.

use std::{
    fmt,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Log severity level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational events.
    Info,
    /// Warning indicator.
    Warn,
    /// Error indicator.
    Error,
}

impl LogLevel {
    /// Upper-case label used in console output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => bail!("unknown log level {other:?}"),
        }
    }
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Module emitting the log.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary JSON payload for metrics/fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attaches metadata. Non-object payloads are stored under `"value"`.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        match metadata {
            Value::Object(map) => self.metadata = map,
            Value::Null => {}
            other => {
                self.metadata.insert("value".into(), other);
            }
        }
        self
    }
}

/// Thread-safe JSON logger with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Writes a log record as JSON line.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }

    /// Returns the underlying file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Builder for [`Telemetry`] handles.
#[derive(Debug)]
pub struct TelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    echo_stderr: bool,
}

impl TelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Info,
            echo_stderr: false,
        }
    }

    /// Sets the JSON log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Records below this level are dropped.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Mirrors warnings and errors to stderr.
    #[must_use]
    pub const fn echo_stderr(mut self, enabled: bool) -> Self {
        self.echo_stderr = enabled;
        self
    }

    /// Builds the telemetry handle, opening the log file if one was configured.
    pub fn build(self) -> Result<Telemetry> {
        let logger = match self.log_path {
            Some(path) => Some(Arc::new(JsonLogger::new(path)?)),
            None => None,
        };
        Ok(Telemetry {
            module: Arc::from(self.module),
            logger,
            min_level: self.min_level,
            echo_stderr: self.echo_stderr,
        })
    }
}

/// Module-scoped logging handle. Clones share the same file.
#[derive(Clone)]
pub struct Telemetry {
    module: Arc<str>,
    logger: Option<Arc<JsonLogger>>,
    min_level: LogLevel,
    echo_stderr: bool,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("module", &self.module)
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> TelemetryBuilder {
        TelemetryBuilder::new(module)
    }

    /// A handle that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            module: Arc::from("disabled"),
            logger: None,
            min_level: LogLevel::Error,
            echo_stderr: false,
        }
    }

    /// Derives a handle for a sub-module sharing the same sink and level.
    #[must_use]
    pub fn scoped(&self, module: &str) -> Self {
        Self {
            module: Arc::from(module),
            logger: self.logger.clone(),
            min_level: self.min_level,
            echo_stderr: self.echo_stderr,
        }
    }

    /// Module name attached to every record.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Whether a record at `level` would be kept.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level && (self.logger.is_some() || self.echo_stderr)
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if level < self.min_level {
            return Ok(());
        }
        if self.echo_stderr && level >= LogLevel::Warn {
            eprintln!("[{level}] {}: {message} {metadata}", self.module);
        }
        if let Some(logger) = &self.logger {
            let record = LogRecord::new(&*self.module, level, message).with_metadata(metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Path of the backing log file, if any.
    #[must_use]
    pub fn log_path(&self) -> Option<&Path> {
        self.logger.as_deref().map(JsonLogger::path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("nested/test.log")).unwrap();
        logger
            .log(&LogRecord::new("module", LogLevel::Info, "hello"))
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(content.contains("\"message\":\"hello\""));
        assert!(content.contains("\"level\":\"INFO\""));
    }

    #[test]
    fn telemetry_filters_below_min_level() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train.jsonl");
        let telemetry = Telemetry::builder("training")
            .log_path(&path)
            .min_level(LogLevel::Info)
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Debug, "training.noise", json!({ "n": 1 }))
            .unwrap();
        telemetry
            .log(LogLevel::Info, "training.stage", json!({ "stage": "cleaned" }))
            .unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        let record: LogRecord = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(record.module, "training");
        assert_eq!(record.metadata["stage"], "cleaned");
    }

    #[test]
    fn scoped_handles_share_the_sink() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("all.jsonl");
        let root = Telemetry::builder("tweetsense")
            .log_path(&path)
            .build()
            .unwrap();
        root.scoped("serving")
            .log(LogLevel::Warn, "audit.write_failed", Value::Null)
            .unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"module\":\"serving\""));
        assert!(!content.contains("metadata"));
    }

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" debug ".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert!(LogLevel::Error > LogLevel::Info);
    }

    #[test]
    fn disabled_handle_is_silent() {
        let telemetry = Telemetry::disabled();
        assert!(!telemetry.enabled(LogLevel::Error));
        telemetry
            .log(LogLevel::Error, "ignored", json!({}))
            .unwrap();
        assert!(telemetry.log_path().is_none());
    }
}
