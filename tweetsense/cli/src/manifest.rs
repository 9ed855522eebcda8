//! JSON-lines ledger of training runs.

use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tweetsense_learning::TrainingStage;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifestEntry {
    pub run_id: String,
    pub submitted_at: DateTime<Utc>,
    pub config: PathBuf,
    pub status: RunStatus,
    pub stage: TrainingStage,
    #[serde(default)]
    pub artifact_version: Option<String>,
    #[serde(default)]
    pub train_accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunManifestEntry {
    pub fn new(config: PathBuf) -> Self {
        Self {
            run_id: format!("run-{}", Uuid::new_v4()),
            submitted_at: Utc::now(),
            config,
            status: RunStatus::Running,
            stage: TrainingStage::Pending,
            artifact_version: None,
            train_accuracy: None,
            error: None,
        }
    }
}

pub fn append_manifest(path: &Path, entry: &RunManifestEntry) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening manifest {}", path.display()))?;
    serde_json::to_writer(&mut file, entry)?;
    file.write_all(b"\n")?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<Vec<RunManifestEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: bad manifest entry", path.display(), number + 1))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Rewrites the entry for `run_id`; returns false when it is absent.
pub fn update_entry(
    path: &Path,
    run_id: &str,
    apply: impl Fn(&mut RunManifestEntry),
) -> Result<bool> {
    let mut entries = read_manifest(path)?;
    let mut changed = false;
    for entry in entries.iter_mut().filter(|entry| entry.run_id == run_id) {
        apply(entry);
        changed = true;
    }
    if !changed {
        return Ok(false);
    }
    let mut file = File::create(path)
        .with_context(|| format!("rewriting manifest {}", path.display()))?;
    for entry in entries {
        serde_json::to_writer(&mut file, &entry)?;
        file.write_all(b"\n")?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_manifest_reads_empty() {
        let dir = tempdir().unwrap();
        assert!(read_manifest(&dir.path().join("runs.jsonl")).unwrap().is_empty());
    }

    #[test]
    fn append_then_complete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/runs.jsonl");
        let first = RunManifestEntry::new(PathBuf::from("config/pipeline.toml"));
        let second = RunManifestEntry::new(PathBuf::from("config/other.toml"));
        append_manifest(&path, &first).unwrap();
        append_manifest(&path, &second).unwrap();

        let updated = update_entry(&path, &first.run_id, |entry| {
            entry.status = RunStatus::Completed;
            entry.stage = TrainingStage::Persisted;
            entry.artifact_version = Some("0123456789abcdef".into());
            entry.train_accuracy = Some(0.75);
        })
        .unwrap();
        assert!(updated);

        let entries = read_manifest(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, RunStatus::Completed);
        assert_eq!(entries[0].stage, TrainingStage::Persisted);
        assert_eq!(entries[1], second);
        assert!(!update_entry(&path, "run-missing", |_| {}).unwrap());
    }

    #[test]
    fn entries_serialize_snake_case() {
        let entry = RunManifestEntry::new(PathBuf::from("c.toml"));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["status"], "running");
        assert_eq!(value["stage"], "pending");
        assert!(value.get("error").is_none());
        assert!(entry.run_id.starts_with("run-"));
    }
}
