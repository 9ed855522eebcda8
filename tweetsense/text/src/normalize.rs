//! Tweet normalization pipeline.
//!
//! [`normalize`] is the only cleaning entry point. Training and serving both
//! call it so the cleaned text seen by the vocabulary is identical in both
//! places. The steps run in a fixed order:
//!
//! 1. lower-case
//! 2. drop stop words
//! 3. drop numeric tokens
//! 4. strip ASCII punctuation (no replacement character)
//! 5. drop URLs
//! 6. lemmatize
//!
//! Steps 2 and 3 look at a token with its punctuation removed, step 5 also
//! catches URL remnants once step 4 has eaten `://` and the dots, and step 6
//! never turns a token into a stop word. With those rules a second pass over
//! the output is a no-op.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{lemma::lemmatize, stopwords::is_stop_word};

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://|www\.)\S*|\b(?:https?|www)\S*").expect("static URL pattern")
});

/// Runs the full cleaning pipeline.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let text = lowercase(raw);
    let text = remove_stop_words(&text);
    let text = remove_numbers(&text);
    let text = remove_punctuation(&text);
    let text = remove_urls(&text);
    lemmatize_text(&text)
}

/// Normalizes a batch in order.
#[must_use]
pub fn normalize_all<S: AsRef<str>>(texts: &[S]) -> Vec<String> {
    texts.iter().map(|text| normalize(text.as_ref())).collect()
}

/// Step 1.
#[must_use]
pub fn lowercase(text: &str) -> String {
    text.to_lowercase()
}

/// Step 2: whitespace tokens whose raw or punctuation-free form is a stop word are dropped.
#[must_use]
pub fn remove_stop_words(text: &str) -> String {
    retain_tokens(text, |token| {
        !is_stop_word(token) && !is_stop_word(&strip_punctuation(token))
    })
}

/// Step 3: tokens made only of digits (ignoring punctuation) are dropped.
#[must_use]
pub fn remove_numbers(text: &str) -> String {
    retain_tokens(text, |token| {
        let bare = strip_punctuation(token);
        bare.is_empty() || !bare.chars().all(|c| c.is_ascii_digit())
    })
}

/// Step 4: ASCII punctuation is deleted in place, so `"sun-day"` becomes `"sunday"`.
#[must_use]
pub fn remove_punctuation(text: &str) -> String {
    strip_punctuation(text).into_owned()
}

/// Step 5.
#[must_use]
pub fn remove_urls(text: &str) -> String {
    URL_RE.replace_all(text, "").into_owned()
}

/// Step 6: each token is lemmatized unless its lemma is a stop word.
#[must_use]
pub fn lemmatize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|token| {
            let lemma = lemmatize(token);
            if is_stop_word(&lemma) {
                token.to_owned()
            } else {
                lemma
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_punctuation(text: &str) -> Cow<'_, str> {
    if text.chars().any(|c| c.is_ascii_punctuation()) {
        Cow::Owned(text.chars().filter(|c| !c.is_ascii_punctuation()).collect())
    } else {
        Cow::Borrowed(text)
    }
}

fn retain_tokens(text: &str, keep: impl Fn(&str) -> bool) -> String {
    text.split_whitespace()
        .filter(|token| keep(token))
        .collect::<Vec<_>>()
        .join(" ")
}
