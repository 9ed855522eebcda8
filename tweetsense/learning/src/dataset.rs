//! Labelled tweet records, CSV ingestion and the seeded train/test split.

use std::{fmt, path::Path};

use indexmap::IndexMap;
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tweetsense_text::normalize;

use crate::error::DataError;

/// The three sentiment classes the model predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    /// `sadness` in the corpus, shown as "Sad".
    Sadness,
    /// `happiness` in the corpus, shown as "Happy".
    Happiness,
    /// `neutral` in the corpus, shown as "Neutral".
    Neutral,
}

impl Sentiment {
    /// All classes in encoding order.
    pub const ALL: [Self; 3] = [Self::Sadness, Self::Happiness, Self::Neutral];

    /// Parses a corpus label, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "sadness" => Some(Self::Sadness),
            "happiness" => Some(Self::Happiness),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    /// Label as it appears in the corpus.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sadness => "sadness",
            Self::Happiness => "happiness",
            Self::Neutral => "neutral",
        }
    }

    /// Human-readable label returned to callers and written to the audit log.
    #[must_use]
    pub const fn display_label(self) -> &'static str {
        match self {
            Self::Sadness => "Sad",
            Self::Happiness => "Happy",
            Self::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps sentiments to class indices and back.
///
/// The encoder is stored inside the artifact bundle, so serving decodes with
/// exactly the convention training used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<Sentiment>,
}

impl Default for LabelEncoder {
    fn default() -> Self {
        Self {
            classes: Sentiment::ALL.to_vec(),
        }
    }
}

impl LabelEncoder {
    /// Class index for `label`, if the encoder knows it.
    #[must_use]
    pub fn encode(&self, label: Sentiment) -> Option<usize> {
        self.classes.iter().position(|class| *class == label)
    }

    /// Sentiment for class `index`.
    #[must_use]
    pub fn decode(&self, index: usize) -> Option<Sentiment> {
        self.classes.get(index).copied()
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Always false for a usable encoder.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Classes in index order.
    #[must_use]
    pub fn classes(&self) -> &[Sentiment] {
        &self.classes
    }

    pub(crate) fn is_complete(&self) -> bool {
        let mut seen = self.classes.clone();
        seen.sort_unstable();
        seen.dedup();
        seen.len() == Sentiment::ALL.len() && self.classes.len() == Sentiment::ALL.len()
    }
}

/// A labelled tweet as ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Tweet text.
    pub text: String,
    /// Sentiment label.
    pub label: Sentiment,
}

impl RawRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(text: impl Into<String>, label: Sentiment) -> Self {
        Self {
            text: text.into(),
            label,
        }
    }

    /// Normalizes the text, keeping the label.
    #[must_use]
    pub fn clean(&self) -> CleanedRecord {
        CleanedRecord {
            text: normalize(&self.text),
            label: self.label,
        }
    }
}

/// A record whose text went through the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedRecord {
    /// Normalized text.
    pub text: String,
    /// Sentiment label.
    pub label: Sentiment,
}

/// CSV column names for text and label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Columns {
    /// Free-text column.
    pub text: String,
    /// Sentiment label column.
    pub label: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            text: "content".into(),
            label: "sentiment".into(),
        }
    }
}

/// Result of reading a CSV file.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Records with a supported label.
    pub records: Vec<RawRecord>,
    /// Data rows read (header excluded).
    pub rows: usize,
    /// Rows dropped per unsupported label, in first-seen order.
    pub skipped: IndexMap<String, usize>,
}

impl IngestReport {
    /// Total rows dropped.
    #[must_use]
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Reads labelled tweets, keeping rows whose label is one of the three supported classes.
pub fn load_records(path: &Path, columns: &Columns) -> Result<IngestReport, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let text_idx = column_index(&headers, &columns.text, path)?;
    let label_idx = column_index(&headers, &columns.label, path)?;

    let mut report = IngestReport::default();
    for row in reader.records() {
        let row = row?;
        report.rows += 1;
        let raw_label = row.get(label_idx).unwrap_or_default();
        match Sentiment::parse(raw_label) {
            Some(label) => report.records.push(RawRecord::new(
                row.get(text_idx).unwrap_or_default(),
                label,
            )),
            None => *report.skipped.entry(raw_label.trim().to_owned()).or_insert(0) += 1,
        }
    }
    Ok(report)
}

/// Writes records with the given column names; labels use their corpus spelling.
pub fn write_records(path: &Path, records: &[RawRecord], columns: &Columns) -> Result<(), DataError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| DataError::io(parent, err))?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([columns.text.as_str(), columns.label.as_str()])?;
    for record in records {
        writer.write_record([record.text.as_str(), record.label.as_str()])?;
    }
    writer.flush().map_err(|err| DataError::io(path, err))?;
    Ok(())
}

/// Shuffles with a seeded `ChaCha8Rng` and returns `(train, test)`.
///
/// The test side receives `ceil(n * test_size)` records, clamped so both sides are non-empty.
pub fn train_test_split(
    mut records: Vec<RawRecord>,
    test_size: f64,
    seed: u64,
) -> Result<(Vec<RawRecord>, Vec<RawRecord>), DataError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(DataError::InvalidSplit(test_size));
    }
    if records.len() < 2 {
        return Err(DataError::EmptyCorpus);
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    records.shuffle(&mut rng);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let n_test = ((records.len() as f64) * test_size).ceil() as usize;
    let n_test = n_test.clamp(1, records.len() - 1);
    let train = records.split_off(n_test);
    Ok((train, records))
}

fn column_index(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize, DataError> {
    headers
        .iter()
        .position(|header| header.trim() == name)
        .ok_or_else(|| DataError::MissingColumn {
            column: name.to_owned(),
            path: path.to_path_buf(),
        })
}
