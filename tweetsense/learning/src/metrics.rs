//! Classification metrics for evaluating a bundle on held-out data.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dataset::LabelEncoder;

/// Precision, recall and F1 for one class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// TP / (TP + FP), zero when nothing was predicted for the class.
    pub precision: f64,
    /// TP / (TP + FN), zero when the class never occurs.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Number of true samples of the class.
    pub support: usize,
}

/// Evaluation summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Fraction of correct predictions.
    pub accuracy: f64,
    /// Unweighted mean F1 over classes.
    pub macro_f1: f64,
    /// `confusion[true][predicted]` counts.
    pub confusion: Vec<Vec<usize>>,
    /// Per-class metrics keyed by display label, in class-index order.
    pub per_class: IndexMap<String, ClassMetrics>,
    /// Samples scored.
    pub samples: usize,
}

impl ClassificationReport {
    /// Builds the report from aligned class-index slices.
    ///
    /// Pairs with an index outside the encoder's range are ignored.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_predictions(truth: &[usize], predicted: &[usize], encoder: &LabelEncoder) -> Self {
        let k = encoder.len();
        let mut confusion = vec![vec![0usize; k]; k];
        let mut samples = 0;
        for (&t, &p) in truth.iter().zip(predicted) {
            if t < k && p < k {
                confusion[t][p] += 1;
                samples += 1;
            }
        }
        let correct: usize = (0..k).map(|i| confusion[i][i]).sum();
        let accuracy = ratio(correct as f64, samples as f64);

        let mut per_class = IndexMap::with_capacity(k);
        for (class, sentiment) in encoder.classes().iter().enumerate() {
            let tp = confusion[class][class] as f64;
            let predicted_total: usize = (0..k).map(|row| confusion[row][class]).sum();
            let support: usize = confusion[class].iter().sum();
            let precision = ratio(tp, predicted_total as f64);
            let recall = ratio(tp, support as f64);
            let f1 = ratio(2.0 * precision * recall, precision + recall);
            per_class.insert(
                sentiment.display_label().to_owned(),
                ClassMetrics {
                    precision,
                    recall,
                    f1,
                    support,
                },
            );
        }
        let macro_f1 = ratio(
            per_class.values().map(|m| m.f1).sum::<f64>(),
            per_class.len() as f64,
        );
        Self {
            accuracy,
            macro_f1,
            confusion,
            per_class,
            samples,
        }
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "[eval] samples={} accuracy={:.4} macro_f1={:.4}",
            self.samples, self.accuracy, self.macro_f1
        )
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions() {
        let encoder = LabelEncoder::default();
        let truth = [0, 1, 2, 1];
        let report = ClassificationReport::from_predictions(&truth, &truth, &encoder);
        assert!((report.accuracy - 1.0).abs() < f64::EPSILON);
        assert!((report.macro_f1 - 1.0).abs() < f64::EPSILON);
        assert_eq!(report.per_class["Happy"].support, 2);
        assert_eq!(report.confusion[1][1], 2);
    }

    #[test]
    fn mixed_predictions() {
        let encoder = LabelEncoder::default();
        let truth = [0, 0, 1, 1, 2, 2];
        let predicted = [0, 1, 1, 1, 2, 0];
        let report = ClassificationReport::from_predictions(&truth, &predicted, &encoder);
        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-12);
        let sad = report.per_class["Sad"];
        assert!((sad.precision - 0.5).abs() < 1e-12);
        assert!((sad.recall - 0.5).abs() < 1e-12);
        let happy = report.per_class["Happy"];
        assert!((happy.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((happy.recall - 1.0).abs() < 1e-12);
        assert_eq!(report.confusion[2], vec![1, 0, 1]);
        assert_eq!(
            report.per_class.keys().collect::<Vec<_>>(),
            vec!["Sad", "Happy", "Neutral"]
        );
    }

    #[test]
    fn empty_input_yields_zeroes() {
        let report = ClassificationReport::from_predictions(&[], &[], &LabelEncoder::default());
        assert_eq!(report.samples, 0);
        assert!(report.accuracy.abs() < f64::EPSILON);
        assert!(report.summary().contains("samples=0"));
    }
}
