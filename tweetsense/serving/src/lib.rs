#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Serving side of the tweet sentiment pipeline. Raw text goes through the
//! same normalizer training used, the bundle's own vocabulary and model, and
//! out as a display label plus one audit line.

/// Prediction audit log.
pub mod audit;
/// JSON-lines request loop.
pub mod console;
/// Serving errors.
pub mod error;
/// Hot-reloadable predictor.
pub mod predictor;

#[cfg(test)]
mod fixtures;

pub use audit::{format_audit_line, AuditSink, FileAuditSink, MemoryAuditSink};
pub use console::{RequestLoop, ServeStats};
pub use error::{AuditWriteError, PredictError};
pub use predictor::{Prediction, Predictor, Reload};
