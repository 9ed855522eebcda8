#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Text side of the tweet sentiment pipeline: the normalizer both training
//! and serving run, and the bag-of-words vocabulary built on its output.

/// Noun lemmatizer.
pub mod lemma;
/// Ordered cleaning pipeline.
pub mod normalize;
/// English stop words.
pub mod stopwords;
/// Vocabulary fitting and count vectors.
pub mod vectorizer;

pub use normalize::{normalize, normalize_all};
pub use vectorizer::{FeatureVector, Vocabulary, DEFAULT_MAX_FEATURES};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaned_text_feeds_the_vocabulary() {
        let raw = [
            "I LOVE sunny days!!!",
            "Rainy days make me sad :(",
            "Just a normal Tuesday, 9 to 5",
        ];
        let cleaned = normalize_all(&raw);
        let vocab = Vocabulary::fit(&cleaned, DEFAULT_MAX_FEATURES);
        let serving = vocab.transform(&normalize("i love SUNNY days"));
        let training = vocab.transform(&cleaned[0]);
        assert_eq!(serving, training);
        assert!(vocab.get("day").is_some());
    }
}
