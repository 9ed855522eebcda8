//! Request-time prediction against the promoted artifact bundle.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use shared_logging::{LogLevel, Telemetry};
use tweetsense_learning::{ArtifactBundle, ArtifactError, ArtifactStore, ModelError, Sentiment};
use tweetsense_text::normalize;

use crate::{
    audit::{format_audit_line, AuditSink},
    error::PredictError,
};

/// Answer to one prediction request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Display label ("Sad", "Happy" or "Neutral").
    pub label: String,
    /// Probability of the winning class.
    pub confidence: f64,
    /// Bundle version that answered.
    pub version: String,
    /// Predicted class.
    #[serde(skip)]
    pub sentiment: Sentiment,
}

/// Outcome of a reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reload {
    /// Version served before.
    pub previous: String,
    /// Version served now.
    pub current: String,
}

impl Reload {
    /// Whether a different bundle is now live.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Serves predictions from one bundle at a time.
///
/// Each request clones the current `Arc` once, so a concurrent reload never
/// mixes the vocabulary of one bundle with the model of another.
pub struct Predictor {
    bundle: RwLock<Arc<ArtifactBundle>>,
    audit: Arc<dyn AuditSink>,
    telemetry: Telemetry,
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

impl Predictor {
    /// Verifies `bundle` and serves it.
    pub fn new(bundle: ArtifactBundle, audit: Arc<dyn AuditSink>) -> Result<Self, ArtifactError> {
        bundle.verify()?;
        Ok(Self::unchecked(bundle, audit))
    }

    /// Loads the promoted bundle from `store`.
    pub fn from_store(
        store: &ArtifactStore,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ArtifactError> {
        Ok(Self::unchecked(store.load_current()?, audit))
    }

    pub(crate) fn unchecked(bundle: ArtifactBundle, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            bundle: RwLock::new(Arc::new(bundle)),
            audit,
            telemetry: Telemetry::disabled(),
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Bundle currently served.
    #[must_use]
    pub fn bundle(&self) -> Arc<ArtifactBundle> {
        Arc::clone(&self.bundle.read())
    }

    /// Version currently served.
    #[must_use]
    pub fn version(&self) -> String {
        self.bundle.read().version().to_owned()
    }

    /// Classifies raw tweet text and records it in the audit log.
    ///
    /// Audit failures are logged and do not fail the request.
    pub fn predict_request(&self, raw_text: &str) -> Result<Prediction, PredictError> {
        if raw_text.trim().is_empty() {
            let err = PredictError::InvalidInput("text is empty".into());
            self.log(LogLevel::Warn, "request_rejected", json!({ "reason": err.to_string() }));
            return Err(err);
        }
        let bundle = self.bundle();
        let prediction = match classify(&bundle, raw_text) {
            Ok(prediction) => prediction,
            Err(err) => {
                self.log(
                    LogLevel::Error,
                    "prediction_failed",
                    json!({ "version": bundle.version(), "error": err.to_string() }),
                );
                return Err(err);
            }
        };

        if let Err(err) = self
            .audit
            .append(&format_audit_line(raw_text, &prediction.label))
        {
            self.log(
                LogLevel::Warn,
                "audit_write_failed",
                json!({ "error": err.to_string() }),
            );
        }
        self.log(
            LogLevel::Info,
            "prediction",
            json!({
                "label": prediction.label,
                "confidence": prediction.confidence,
                "version": prediction.version,
                "chars": raw_text.chars().count(),
            }),
        );
        Ok(prediction)
    }

    /// Like [`Self::predict_request`] for a JSON value that should hold a string.
    pub fn predict_value(&self, text: &Value) -> Result<Prediction, PredictError> {
        match text {
            Value::String(text) => self.predict_request(text),
            other => {
                let err = PredictError::InvalidInput(format!(
                    "text must be a string, got {}",
                    json_kind(other)
                ));
                self.log(LogLevel::Warn, "request_rejected", json!({ "reason": err.to_string() }));
                Err(err)
            }
        }
    }

    /// Swaps in the bundle `CURRENT` points at.
    ///
    /// On failure the previous bundle stays live.
    pub fn reload(&self, store: &ArtifactStore) -> Result<Reload, ArtifactError> {
        let next = match store.load_current() {
            Ok(bundle) => Arc::new(bundle),
            Err(err) => {
                self.log(
                    LogLevel::Error,
                    "reload_failed",
                    json!({ "dir": store.dir().display().to_string(), "error": err.to_string() }),
                );
                return Err(err);
            }
        };
        let current = next.version().to_owned();
        let previous = {
            let mut slot = self.bundle.write();
            let previous = slot.version().to_owned();
            *slot = next;
            previous
        };
        let reload = Reload { previous, current };
        self.log(
            LogLevel::Info,
            "bundle_reloaded",
            json!({ "previous": reload.previous, "current": reload.current, "changed": reload.changed() }),
        );
        Ok(reload)
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        let _ = self.telemetry.log(level, message, metadata);
    }
}

fn classify(bundle: &ArtifactBundle, raw_text: &str) -> Result<Prediction, PredictError> {
    let features = bundle.vocabulary().transform(&normalize(raw_text));
    let model = bundle.model();
    let mismatch = |err: ModelError| match err {
        ModelError::DimensionMismatch { expected, got } => {
            PredictError::ArtifactMismatch { expected, got }
        }
        other => PredictError::CorruptArtifact(other.to_string()),
    };
    let proba = model.predict_proba(&features).map_err(mismatch)?;
    let class = model.predict(&features).map_err(mismatch)?;
    let sentiment = bundle
        .classes()
        .decode(class)
        .ok_or(PredictError::ArtifactMismatch {
            expected: bundle.classes().len(),
            got: model.n_classes(),
        })?;
    Ok(Prediction {
        label: sentiment.display_label().to_owned(),
        confidence: proba.get(class).copied().unwrap_or_default(),
        version: bundle.version().to_owned(),
        sentiment,
    })
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
