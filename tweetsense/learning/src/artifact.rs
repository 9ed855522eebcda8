//! Versioned artifact bundle and its on-disk store.
//!
//! Vocabulary, model and label encoder travel together in one file, so a
//! mismatched pair cannot be loaded. The store writes every file through a
//! temporary sibling and an atomic rename, then moves the `CURRENT` pointer
//! the same way.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tweetsense_text::Vocabulary;

use crate::{classifier::LogisticModel, dataset::LabelEncoder, error::ArtifactError};

/// On-disk bundle layout revision.
pub const BUNDLE_FORMAT: u32 = 1;

const CURRENT_POINTER: &str = "CURRENT";
const BUNDLE_PREFIX: &str = "bundle-";
const BUNDLE_SUFFIX: &str = ".json";

/// Everything serving needs from one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    format: u32,
    version: String,
    classes: LabelEncoder,
    vocabulary: Vocabulary,
    model: LogisticModel,
}

#[derive(Serialize)]
struct Payload<'a> {
    format: u32,
    classes: &'a LabelEncoder,
    vocabulary: &'a Vocabulary,
    model: &'a LogisticModel,
}

impl ArtifactBundle {
    /// Bundles the fitted parts and derives the content version.
    pub fn new(
        classes: LabelEncoder,
        vocabulary: Vocabulary,
        model: LogisticModel,
    ) -> Result<Self, ArtifactError> {
        let version = fingerprint(&Payload {
            format: BUNDLE_FORMAT,
            classes: &classes,
            vocabulary: &vocabulary,
            model: &model,
        })?;
        let bundle = Self {
            format: BUNDLE_FORMAT,
            version,
            classes,
            vocabulary,
            model,
        };
        bundle.check_shapes()?;
        Ok(bundle)
    }

    /// Content hash (16 hex chars of SHA-256 over the payload).
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Label encoder used at training time.
    #[must_use]
    pub const fn classes(&self) -> &LabelEncoder {
        &self.classes
    }

    /// Fitted vocabulary.
    #[must_use]
    pub const fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Fitted classifier.
    #[must_use]
    pub const fn model(&self) -> &LogisticModel {
        &self.model
    }

    /// Checks the format, the part shapes and the content hash.
    pub fn verify(&self) -> Result<(), ArtifactError> {
        if self.format != BUNDLE_FORMAT {
            return Err(ArtifactError::Corrupt(format!(
                "unsupported bundle format {}",
                self.format
            )));
        }
        self.check_shapes()?;
        let expected = fingerprint(&Payload {
            format: self.format,
            classes: &self.classes,
            vocabulary: &self.vocabulary,
            model: &self.model,
        })?;
        if expected != self.version {
            return Err(ArtifactError::Corrupt(format!(
                "version {} does not match content hash {expected}",
                self.version
            )));
        }
        Ok(())
    }

    fn check_shapes(&self) -> Result<(), ArtifactError> {
        if !self.vocabulary.has_ordered_indices() {
            return Err(ArtifactError::Corrupt(
                "vocabulary indices are not 0..len in term order".into(),
            ));
        }
        self.model
            .check_shape()
            .map_err(|err| ArtifactError::Corrupt(err.to_string()))?;
        if self.vocabulary.len() != self.model.n_features() {
            return Err(ArtifactError::Corrupt(format!(
                "vocabulary has {} terms but model expects {} features",
                self.vocabulary.len(),
                self.model.n_features()
            )));
        }
        if !self.classes.is_complete() || self.model.n_classes() != self.classes.len() {
            return Err(ArtifactError::Corrupt(format!(
                "model has {} classes, label encoder has {}",
                self.model.n_classes(),
                self.classes.len()
            )));
        }
        Ok(())
    }
}

fn fingerprint(payload: &Payload<'_>) -> Result<String, ArtifactError> {
    let bytes = serde_json::to_vec(payload)?;
    let digest = Sha256::digest(&bytes);
    let mut hex = format!("{digest:x}");
    hex.truncate(16);
    Ok(hex)
}

/// Directory holding bundles and the `CURRENT` pointer.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `dir` (created lazily on first write).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the bundle file for `version`.
    #[must_use]
    pub fn bundle_path(&self, version: &str) -> PathBuf {
        self.dir
            .join(format!("{BUNDLE_PREFIX}{version}{BUNDLE_SUFFIX}"))
    }

    /// Writes the bundle file without promoting it.
    pub fn save(&self, bundle: &ArtifactBundle) -> Result<PathBuf, ArtifactError> {
        let path = self.bundle_path(bundle.version());
        let bytes = serde_json::to_vec_pretty(bundle)?;
        self.write_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// Points `CURRENT` at an existing bundle.
    pub fn promote(&self, version: &str) -> Result<(), ArtifactError> {
        let path = self.bundle_path(version);
        if !path.is_file() {
            return Err(ArtifactError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "bundle file missing"),
            ));
        }
        let pointer = self.dir.join(CURRENT_POINTER);
        self.write_atomic(&pointer, format!("{version}\n").as_bytes())
    }

    /// Saves and promotes in one step.
    pub fn publish(&self, bundle: &ArtifactBundle) -> Result<PathBuf, ArtifactError> {
        let path = self.save(bundle)?;
        self.promote(bundle.version())?;
        Ok(path)
    }

    /// Version named by `CURRENT`, if any.
    pub fn current_version(&self) -> Result<Option<String>, ArtifactError> {
        let pointer = self.dir.join(CURRENT_POINTER);
        match fs::read_to_string(&pointer) {
            Ok(raw) => {
                let version = raw.trim();
                Ok((!version.is_empty()).then(|| version.to_owned()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ArtifactError::io(pointer, err)),
        }
    }

    /// Loads and verifies a specific version.
    pub fn load(&self, version: &str) -> Result<ArtifactBundle, ArtifactError> {
        let path = self.bundle_path(version);
        let bytes = fs::read(&path).map_err(|err| ArtifactError::io(&path, err))?;
        let bundle: ArtifactBundle = serde_json::from_slice(&bytes)?;
        bundle.verify()?;
        if bundle.version() != version {
            return Err(ArtifactError::Corrupt(format!(
                "{} holds version {}",
                path.display(),
                bundle.version()
            )));
        }
        Ok(bundle)
    }

    /// Loads the promoted bundle.
    pub fn load_current(&self) -> Result<ArtifactBundle, ArtifactError> {
        let version = self
            .current_version()?
            .ok_or_else(|| ArtifactError::NoCurrent(self.dir.clone()))?;
        self.load(&version)
    }

    /// Versions present on disk, sorted.
    pub fn versions(&self) -> Result<Vec<String>, ArtifactError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ArtifactError::io(&self.dir, err)),
        };
        let mut versions: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_prefix(BUNDLE_PREFIX)?
                    .strip_suffix(BUNDLE_SUFFIX)
                    .map(ToOwned::to_owned)
            })
            .collect();
        versions.sort();
        Ok(versions)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.dir).map_err(|err| ArtifactError::io(&self.dir, err))?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|err| ArtifactError::io(&self.dir, err))?;
        tmp.write_all(bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|err| ArtifactError::io(tmp.path(), err))?;
        tmp.persist(path)
            .map_err(|err| ArtifactError::io(path, err.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn bundle() -> ArtifactBundle {
        let vocabulary = Vocabulary::fit(&["love sunny day", "sad rainy day"], 10);
        let model = LogisticModel::zeros(3, vocabulary.len());
        ArtifactBundle::new(LabelEncoder::default(), vocabulary, model).unwrap()
    }

    #[test]
    fn version_is_a_content_hash() {
        let first = bundle();
        let second = bundle();
        assert_eq!(first.version(), second.version());
        assert_eq!(first.version().len(), 16);
        first.verify().unwrap();
    }

    #[test]
    fn mismatched_parts_are_rejected() {
        let vocabulary = Vocabulary::fit(&["love sunny day"], 10);
        let model = LogisticModel::zeros(3, vocabulary.len() + 1);
        let err = ArtifactBundle::new(LabelEncoder::default(), vocabulary, model).unwrap_err();
        assert!(matches!(err, ArtifactError::Corrupt(_)));
    }

    fn tamper(bundle: &ArtifactBundle, edit: impl FnOnce(&mut serde_json::Value)) -> ArtifactBundle {
        let mut value = serde_json::to_value(bundle).unwrap();
        edit(&mut value);
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn short_weight_rows_fail_verification() {
        let truncated = tamper(&bundle(), |value| {
            for row in value["model"]["weights"].as_array_mut().unwrap() {
                row.as_array_mut().unwrap().truncate(1);
            }
        });
        let err = truncated.verify().unwrap_err();
        assert!(matches!(&err, ArtifactError::Corrupt(msg) if msg.contains("weight row")));
    }

    #[test]
    fn out_of_order_vocabulary_indices_fail_verification() {
        let shuffled = tamper(&bundle(), |value| {
            value["vocabulary"]["index"]["day"] = serde_json::json!(3);
            value["vocabulary"]["index"]["love"] = serde_json::json!(0);
        });
        let err = shuffled.verify().unwrap_err();
        assert!(matches!(&err, ArtifactError::Corrupt(msg) if msg.contains("vocabulary indices")));
    }

    #[test]
    fn publish_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"));
        assert!(store.current_version().unwrap().is_none());
        assert!(matches!(store.load_current(), Err(ArtifactError::NoCurrent(_))));

        let bundle = bundle();
        let path = store.publish(&bundle).unwrap();
        assert!(path.ends_with(format!("bundle-{}.json", bundle.version())));
        assert_eq!(store.current_version().unwrap().as_deref(), Some(bundle.version()));
        assert_eq!(store.load_current().unwrap(), bundle);
        assert_eq!(store.versions().unwrap(), vec![bundle.version().to_owned()]);
    }

    #[test]
    fn republishing_is_byte_identical() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let path = store.publish(&bundle()).unwrap();
        let first = fs::read(&path).unwrap();
        store.publish(&bundle()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
        assert_eq!(store.versions().unwrap().len(), 1);
    }

    #[test]
    fn tampered_bundle_fails_verification() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let bundle = bundle();
        let path = store.publish(&bundle).unwrap();
        let tampered = fs::read_to_string(&path)
            .unwrap()
            .replace("\"sunny\"", "\"stormy\"");
        fs::write(&path, tampered).unwrap();
        assert!(matches!(
            store.load(bundle.version()),
            Err(ArtifactError::Corrupt(_))
        ));
    }

    #[test]
    fn promote_requires_existing_bundle() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(matches!(
            store.promote("deadbeefdeadbeef"),
            Err(ArtifactError::Io { .. })
        ));
    }
}
