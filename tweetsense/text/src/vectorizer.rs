//! Bag-of-words vocabulary and count vectors.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default upper bound on vocabulary size.
pub const DEFAULT_MAX_FEATURES: usize = 5000;

static TERM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("static term pattern"));

/// Splits cleaned text into vocabulary terms (two or more word characters).
pub fn terms(text: &str) -> impl Iterator<Item = &str> {
    TERM_RE.find_iter(text).map(|m| m.as_str())
}

/// Fitted term → feature index mapping.
///
/// Indices follow the lexicographic order of the terms, so two vocabularies
/// with the same terms are identical and serialize to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    index: BTreeMap<String, usize>,
    max_features: usize,
}

impl Vocabulary {
    /// Builds the vocabulary from cleaned documents.
    ///
    /// Keeps the `max_features` most frequent terms by total count across
    /// the corpus; equal counts are ordered lexicographically.
    #[must_use]
    pub fn fit<S: AsRef<str>>(corpus: &[S], max_features: usize) -> Self {
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for doc in corpus {
            for term in terms(doc.as_ref()) {
                *counts.entry(term).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(&str, u64)> = counts.into_iter().collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features);

        let mut kept: Vec<&str> = ranked.into_iter().map(|(term, _)| term).collect();
        kept.sort_unstable();
        let index = kept
            .into_iter()
            .enumerate()
            .map(|(idx, term)| (term.to_owned(), idx))
            .collect();
        Self {
            index,
            max_features,
        }
    }

    /// Counts in-vocabulary terms of `text`. Unknown terms are ignored.
    #[must_use]
    pub fn transform(&self, text: &str) -> FeatureVector {
        let mut counts: BTreeMap<usize, u32> = BTreeMap::new();
        for term in terms(text) {
            if let Some(&idx) = self.index.get(term) {
                *counts.entry(idx).or_insert(0) += 1;
            }
        }
        FeatureVector {
            dim: self.index.len(),
            entries: counts.into_iter().collect(),
        }
    }

    /// Transforms a batch of cleaned documents.
    #[must_use]
    pub fn transform_all<S: AsRef<str>>(&self, corpus: &[S]) -> Vec<FeatureVector> {
        corpus.iter().map(|doc| self.transform(doc.as_ref())).collect()
    }

    /// Number of terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when fitting found no terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Feature index of `term`.
    #[must_use]
    pub fn get(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    /// The bound the vocabulary was fitted with.
    #[must_use]
    pub const fn max_features(&self) -> usize {
        self.max_features
    }

    /// Terms in feature-index order.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// True when the indices are exactly `0..len` in term order, as `fit` assigns them.
    #[must_use]
    pub fn has_ordered_indices(&self) -> bool {
        self.index.values().enumerate().all(|(pos, &idx)| pos == idx)
    }
}

/// Sparse term-count vector of fixed logical length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureVector {
    dim: usize,
    entries: Vec<(usize, u32)>,
}

impl FeatureVector {
    /// Builds a vector from a dense count slice.
    #[must_use]
    pub fn from_dense(counts: &[u32]) -> Self {
        Self {
            dim: counts.len(),
            entries: counts
                .iter()
                .enumerate()
                .filter(|(_, &count)| count > 0)
                .map(|(idx, &count)| (idx, count))
                .collect(),
        }
    }

    /// Logical length (vocabulary size).
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Number of non-zero entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// True when every count is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count at index `idx` (zero when out of range).
    #[must_use]
    pub fn get(&self, idx: usize) -> u32 {
        self.entries
            .binary_search_by_key(&idx, |&(i, _)| i)
            .map_or(0, |pos| self.entries[pos].1)
    }

    /// Non-zero `(index, count)` pairs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.entries.iter().copied()
    }

    /// Dense representation.
    #[must_use]
    pub fn to_dense(&self) -> Vec<u32> {
        let mut dense = vec![0; self.dim];
        for &(idx, count) in &self.entries {
            dense[idx] = count;
        }
        dense
    }
}
