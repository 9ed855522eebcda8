//! JSON-lines request loop.
//!
//! One request per line:
//! `{"type":"predict","text":"..."}`, `{"type":"reload"}` or `{"type":"quit"}`.
//! Every request except `quit` gets exactly one response line. A bad line is
//! answered with an error and the loop keeps reading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::{LogLevel, Telemetry};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tweetsense_learning::ArtifactStore;

use crate::predictor::{Prediction, Predictor};

/// Requests accepted on the loop.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServeRequest {
    /// Classify a tweet.
    Predict {
        /// Tweet text; anything but a non-empty string is a bad request.
        #[serde(default)]
        text: Value,
    },
    /// Swap in the currently promoted bundle.
    Reload,
    /// Stop reading.
    Quit,
}

/// Error category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request itself was unusable.
    BadRequest,
    /// The server could not answer; details are in the structured log.
    Internal,
}

/// One response line.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ServeResponse {
    /// Successful prediction.
    Prediction(Prediction),
    /// Result of a reload.
    Reloaded {
        /// Whether a different bundle is now live.
        reloaded: bool,
        /// Version now served.
        version: String,
    },
    /// Rejected or failed request.
    Error {
        /// Category.
        error: ErrorKind,
        /// Caller-facing message.
        message: String,
    },
}

impl ServeResponse {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Error {
            error: ErrorKind::BadRequest,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::Error {
            error: ErrorKind::Internal,
            message: message.into(),
        }
    }
}

/// Counters for one loop run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServeStats {
    /// Non-blank lines read.
    pub requests: usize,
    /// Predictions answered.
    pub predictions: usize,
    /// Requests rejected as bad.
    pub rejected: usize,
    /// Requests that failed server-side.
    pub failed: usize,
    /// Successful reloads.
    pub reloads: usize,
}

enum Step {
    Respond(ServeResponse),
    Quit,
}

/// Drives a [`Predictor`] from a line-oriented reader.
#[derive(Debug)]
pub struct RequestLoop<'a> {
    predictor: &'a Predictor,
    store: &'a ArtifactStore,
    telemetry: Telemetry,
}

impl<'a> RequestLoop<'a> {
    /// Creates a loop; `store` is what `reload` reads from.
    #[must_use]
    pub fn new(predictor: &'a Predictor, store: &'a ArtifactStore, telemetry: Telemetry) -> Self {
        Self {
            predictor,
            store,
            telemetry,
        }
    }

    /// Serves stdin to stdout until EOF or `quit`.
    pub async fn run_stdio(&self) -> Result<ServeStats> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.run(stdin, tokio::io::stdout()).await
    }

    /// Serves `reader` to `writer` until EOF or `quit`.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> Result<ServeStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut stats = ServeStats::default();
        let mut buf = Vec::new();
        self.log(LogLevel::Info, "serve_started", json!({ "version": self.predictor.version() }));
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .context("reading request line")?;
            if read == 0 {
                break;
            }
            let step = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    stats.requests += 1;
                    self.handle(line.trim(), &mut stats)
                }
                Err(_) => {
                    stats.requests += 1;
                    stats.rejected += 1;
                    self.log(LogLevel::Warn, "request_rejected", json!({ "reason": "invalid utf-8" }));
                    Step::Respond(ServeResponse::bad_request("request is not valid UTF-8"))
                }
            };
            match step {
                Step::Quit => break,
                Step::Respond(response) => {
                    let mut line = serde_json::to_string(&response).context("encoding response")?;
                    line.push('\n');
                    writer
                        .write_all(line.as_bytes())
                        .await
                        .context("writing response")?;
                    writer.flush().await.context("flushing response")?;
                }
            }
        }
        self.log(
            LogLevel::Info,
            "serve_stopped",
            serde_json::to_value(stats).unwrap_or_default(),
        );
        Ok(stats)
    }

    fn handle(&self, line: &str, stats: &mut ServeStats) -> Step {
        let request: ServeRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                stats.rejected += 1;
                self.log(
                    LogLevel::Warn,
                    "request_rejected",
                    json!({ "reason": err.to_string() }),
                );
                return Step::Respond(ServeResponse::bad_request(format!("malformed request: {err}")));
            }
        };
        match request {
            ServeRequest::Quit => Step::Quit,
            ServeRequest::Predict { text } => match self.predictor.predict_value(&text) {
                Ok(prediction) => {
                    stats.predictions += 1;
                    Step::Respond(ServeResponse::Prediction(prediction))
                }
                Err(err) if err.is_bad_request() => {
                    stats.rejected += 1;
                    Step::Respond(ServeResponse::bad_request(err.to_string()))
                }
                Err(_) => {
                    stats.failed += 1;
                    Step::Respond(ServeResponse::internal("prediction failed"))
                }
            },
            ServeRequest::Reload => match self.predictor.reload(self.store) {
                Ok(reload) => {
                    stats.reloads += 1;
                    Step::Respond(ServeResponse::Reloaded {
                        reloaded: reload.changed(),
                        version: reload.current,
                    })
                }
                Err(_) => {
                    stats.failed += 1;
                    Step::Respond(ServeResponse::internal("reload failed"))
                }
            },
        }
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        let _ = self.telemetry.log(level, message, metadata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audit::MemoryAuditSink, fixtures};
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn drive(predictor: &Predictor, store: &ArtifactStore, input: &[u8]) -> (ServeStats, Vec<Value>) {
        let mut output = Vec::new();
        let stats = RequestLoop::new(predictor, store, Telemetry::disabled())
            .run(input, &mut output)
            .await
            .unwrap();
        let responses = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        (stats, responses)
    }

    #[tokio::test]
    async fn answers_each_request_and_survives_bad_lines() {
        let dir = tempdir().unwrap();
        let store = fixtures::trained_store(dir.path());
        let predictor = Predictor::from_store(&store, Arc::new(MemoryAuditSink::new())).unwrap();
        let input = b"{\"type\":\"predict\",\"text\":\"happy sunny fun\"}\n\
\n\
not json\n\
{\"type\":\"predict\",\"text\":\"\"}\n\
{\"type\":\"predict\",\"text\":7}\n\
{\"type\":\"dance\"}\n\
\xff\xfe\n\
{\"type\":\"predict\",\"text\":\"sad rainy night\"}\n";
        let (stats, responses) = drive(&predictor, &store, input).await;

        assert_eq!(responses.len(), 7);
        assert_eq!(responses[0]["label"], "Happy");
        assert_eq!(responses[0]["version"], predictor.version().as_str());
        assert!(responses[0]["confidence"].as_f64().unwrap() > 0.0);
        for response in &responses[1..6] {
            assert_eq!(response["error"], "bad_request");
        }
        assert_eq!(responses[6]["label"], "Sad");
        assert_eq!(
            stats,
            ServeStats {
                requests: 7,
                predictions: 2,
                rejected: 5,
                failed: 0,
                reloads: 0,
            }
        );
    }

    #[tokio::test]
    async fn quit_stops_reading() {
        let dir = tempdir().unwrap();
        let store = fixtures::trained_store(dir.path());
        let predictor = Predictor::from_store(&store, Arc::new(MemoryAuditSink::new())).unwrap();
        let input = b"{\"type\":\"quit\"}\n{\"type\":\"predict\",\"text\":\"happy\"}\n";
        let (stats, responses) = drive(&predictor, &store, input).await;
        assert!(responses.is_empty());
        assert_eq!(stats.requests, 1);
    }

    #[tokio::test]
    async fn reload_picks_up_new_bundle() {
        let dir = tempdir().unwrap();
        let store = fixtures::trained_store(dir.path());
        let predictor = Predictor::from_store(&store, Arc::new(MemoryAuditSink::new())).unwrap();
        let retrained = fixtures::retrain_with_extra(&store);
        let input = b"{\"type\":\"reload\"}\n{\"type\":\"predict\",\"text\":\"office train\"}\n";
        let (stats, responses) = drive(&predictor, &store, input).await;
        assert_eq!(responses[0]["reloaded"], true);
        assert_eq!(responses[0]["version"], retrained.as_str());
        assert_eq!(responses[1]["version"], retrained.as_str());
        assert_eq!(stats.reloads, 1);
    }

    #[tokio::test]
    async fn corrupt_model_answers_internal_and_keeps_serving() {
        let dir = tempdir().unwrap();
        let store = fixtures::trained_store(dir.path());
        let bundle = fixtures::truncated_weights(&store.load_current().unwrap());
        let predictor = Predictor::unchecked(bundle, Arc::new(MemoryAuditSink::new()));
        let input = b"{\"type\":\"predict\",\"text\":\"happy sunny fun\"}\n\
{\"type\":\"reload\"}\n\
{\"type\":\"predict\",\"text\":\"happy sunny fun\"}\n";
        let (stats, responses) = drive(&predictor, &store, input).await;

        assert_eq!(responses[0]["error"], "internal");
        assert_eq!(responses[0]["message"], "prediction failed");
        assert_eq!(responses[1]["version"], predictor.version().as_str());
        assert_eq!(responses[2]["label"], "Happy");
        assert_eq!(stats.reloads, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.predictions, 1);
    }

    #[tokio::test]
    async fn failed_reload_is_an_internal_error() {
        let dir = tempdir().unwrap();
        let store = fixtures::trained_store(dir.path());
        let predictor = Predictor::from_store(&store, Arc::new(MemoryAuditSink::new())).unwrap();
        let elsewhere = ArtifactStore::new(dir.path().join("empty"));
        let (stats, responses) = drive(&predictor, &elsewhere, b"{\"type\":\"reload\"}\n").await;
        assert_eq!(responses[0]["error"], "internal");
        assert_eq!(stats.failed, 1);
    }
}
