mod manifest;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use shared_logging::{LogLevel, Telemetry};
use tokio::runtime::Runtime;
use tweetsense_learning::{
    dataset, evaluate, prepare_splits, ArtifactStore, PipelineConfig, TrainingDriver,
};
use tweetsense_serving::{FileAuditSink, Prediction, Predictor, RequestLoop};

use crate::manifest::{append_manifest, read_manifest, update_entry, RunManifestEntry, RunStatus};

#[derive(Parser, Debug)]
#[command(name = "tweetsense", version, about = "Tweet sentiment training and serving")]
struct Cli {
    /// Pipeline configuration file.
    #[arg(long, global = true, default_value = "config/pipeline.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Splits the raw dataset into seeded train and test files.
    Split,
    /// Trains on the train split and promotes a new bundle.
    Train {
        /// Run ledger to append to.
        #[arg(long, default_value = "logs/runs.jsonl")]
        manifest: PathBuf,
    },
    /// Scores the current bundle on the test split (or another CSV).
    Evaluate {
        /// Labelled CSV to score instead of the configured test split.
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Classifies one text with the current bundle.
    Predict {
        /// Raw tweet text.
        text: String,
    },
    /// Answers JSON-lines requests on stdin until EOF or quit.
    Serve,
    /// Lists recent training runs.
    Runs {
        /// Number of entries to display.
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Run ledger to read.
        #[arg(long, default_value = "logs/runs.jsonl")]
        manifest: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Commands::Runs { limit, manifest } = &cli.command {
        return list_runs(manifest, *limit);
    }
    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let telemetry = telemetry(&config)?;
    match cli.command {
        Commands::Split => handle_split(&config, &telemetry),
        Commands::Train { manifest } => handle_train(&cli.config, &config, &manifest, &telemetry),
        Commands::Evaluate { data } => handle_evaluate(&config, data, &telemetry),
        Commands::Predict { text } => handle_predict(&config, &text, &telemetry),
        Commands::Serve => handle_serve(&config, &telemetry),
        Commands::Runs { .. } => Ok(()),
    }
}

fn telemetry(config: &PipelineConfig) -> Result<Telemetry> {
    Telemetry::builder("tweetsense")
        .log_path(&config.logging.path)
        .min_level(config.logging.min_level()?)
        .echo_stderr(true)
        .build()
}

fn handle_split(config: &PipelineConfig, telemetry: &Telemetry) -> Result<()> {
    let report = prepare_splits(&config.data, &telemetry.scoped("dataset"))
        .with_context(|| format!("splitting {}", config.data.raw_csv.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_train(
    config_path: &Path,
    config: &PipelineConfig,
    manifest: &Path,
    telemetry: &Telemetry,
) -> Result<()> {
    let entry = RunManifestEntry::new(config_path.to_path_buf());
    append_manifest(manifest, &entry)?;
    let telemetry = telemetry.scoped("training");
    let _ = telemetry.log(
        LogLevel::Info,
        "run_started",
        json!({ "run_id": entry.run_id, "config": entry.config }),
    );

    let mut driver = TrainingDriver::from_config(config).with_telemetry(telemetry.clone());
    match driver.run_csv(&config.data) {
        Ok(outcome) => {
            update_entry(manifest, &entry.run_id, |e| {
                e.status = RunStatus::Completed;
                e.stage = outcome.stage;
                e.artifact_version = Some(outcome.bundle.version().to_owned());
                e.train_accuracy = Some(outcome.train_report.accuracy);
            })?;
            let _ = telemetry.log(
                LogLevel::Info,
                "run_completed",
                json!({ "run_id": entry.run_id, "version": outcome.bundle.version() }),
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "run_id": entry.run_id,
                    "version": outcome.bundle.version(),
                    "path": outcome.path,
                    "vocabulary": outcome.bundle.vocabulary().len(),
                    "fit": outcome.fit,
                    "train_accuracy": outcome.train_report.accuracy,
                }))?
            );
            Ok(())
        }
        Err(err) => {
            update_entry(manifest, &entry.run_id, |e| {
                e.status = RunStatus::Failed;
                e.stage = err.stage();
                e.error = Some(err.to_string());
            })?;
            let _ = telemetry.log(
                LogLevel::Error,
                "run_failed",
                json!({ "run_id": entry.run_id, "stage": err.stage(), "error": err.to_string() }),
            );
            Err(err).context("training run failed")
        }
    }
}

fn handle_evaluate(
    config: &PipelineConfig,
    data: Option<PathBuf>,
    telemetry: &Telemetry,
) -> Result<()> {
    let store = ArtifactStore::new(&config.artifacts.dir);
    let bundle = store.load_current().context("loading current bundle")?;
    let path = data.unwrap_or_else(|| config.data.test_csv.clone());
    let ingest = dataset::load_records(&path, &config.data.columns())
        .with_context(|| format!("reading {}", path.display()))?;
    if ingest.records.is_empty() {
        bail!("no labelled records in {}", path.display());
    }
    let report = evaluate(&bundle, &ingest.records)?;
    let _ = telemetry.scoped("evaluation").log(
        LogLevel::Info,
        "evaluation_completed",
        json!({
            "version": bundle.version(),
            "data": path.display().to_string(),
            "samples": report.samples,
            "accuracy": report.accuracy,
            "macro_f1": report.macro_f1,
        }),
    );
    eprintln!("{}", report.summary());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn predictor(config: &PipelineConfig, telemetry: &Telemetry) -> Result<(Predictor, ArtifactStore)> {
    let telemetry = telemetry.scoped("serving");
    let store = ArtifactStore::new(&config.artifacts.dir);
    let audit = FileAuditSink::new(&config.serving.audit_log);
    if let Err(err) = audit.ensure_open() {
        let _ = telemetry.log(
            LogLevel::Warn,
            "audit_unavailable",
            json!({ "path": audit.path().display().to_string(), "error": err.to_string() }),
        );
    }
    let predictor = Predictor::from_store(&store, Arc::new(audit))
        .context("loading current bundle")?
        .with_telemetry(telemetry);
    Ok((predictor, store))
}

fn predict_once(config: &PipelineConfig, text: &str, telemetry: &Telemetry) -> Result<Prediction> {
    let (predictor, _) = predictor(config, telemetry)?;
    Ok(predictor.predict_request(text)?)
}

fn handle_predict(config: &PipelineConfig, text: &str, telemetry: &Telemetry) -> Result<()> {
    let prediction = predict_once(config, text, telemetry)?;
    println!("{}", serde_json::to_string(&prediction)?);
    Ok(())
}

fn handle_serve(config: &PipelineConfig, telemetry: &Telemetry) -> Result<()> {
    let (predictor, store) = predictor(config, telemetry)?;
    let runtime = Runtime::new()?;
    let requests = RequestLoop::new(&predictor, &store, telemetry.scoped("serving"));
    let stats = runtime.block_on(requests.run_stdio())?;
    eprintln!(
        "[serve] requests={} predictions={} rejected={} failed={} reloads={}",
        stats.requests, stats.predictions, stats.rejected, stats.failed, stats.reloads
    );
    Ok(())
}

fn list_runs(manifest: &Path, limit: usize) -> Result<()> {
    let entries = read_manifest(manifest)?;
    for entry in entries.into_iter().rev().take(limit) {
        println!(
            "{} | {} | {} | {} | {} | {}",
            entry.run_id,
            entry.submitted_at,
            entry.status,
            entry.stage,
            entry.artifact_version.as_deref().unwrap_or("-"),
            entry
                .train_accuracy
                .map_or_else(|| "-".to_owned(), |accuracy| format!("{accuracy:.4}")),
        );
    }
    Ok(())
}
