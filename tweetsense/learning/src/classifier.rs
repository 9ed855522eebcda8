//! Multinomial logistic regression over sparse count vectors.

use serde::{Deserialize, Serialize};
use tweetsense_text::FeatureVector;

use crate::error::ModelError;

/// Solver settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Inverse L2 regularization strength.
    pub c: f64,
    /// Gradient descent step size.
    pub learning_rate: f64,
    /// Iteration cap.
    pub max_iter: usize,
    /// Stop once the loss improves by less than this.
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            learning_rate: 0.1,
            max_iter: 500,
            tolerance: 1e-6,
        }
    }
}

impl SolverConfig {
    /// Rejects non-positive or non-finite settings.
    pub fn validate(&self) -> Result<(), ModelError> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(ModelError::InvalidParameter(format!("c must be > 0, got {}", self.c)));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        if self.max_iter == 0 {
            return Err(ModelError::InvalidParameter("max_iter must be >= 1".into()));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "tolerance must be >= 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Convergence details of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    /// Iterations performed.
    pub iterations: usize,
    /// Objective value after the last update.
    pub final_loss: f64,
    /// Whether the tolerance was reached before `max_iter`.
    pub converged: bool,
}

/// Fitted linear model: one weight row and intercept per class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    n_features: usize,
    weights: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl LogisticModel {
    /// Zero-initialised model.
    #[must_use]
    pub fn zeros(n_classes: usize, n_features: usize) -> Self {
        Self {
            n_features,
            weights: vec![vec![0.0; n_features]; n_classes],
            intercepts: vec![0.0; n_classes],
        }
    }

    /// Expected feature vector length.
    #[must_use]
    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    /// Number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.intercepts.len()
    }

    /// Weight row for class `class`.
    #[must_use]
    pub fn weights(&self, class: usize) -> Option<&[f64]> {
        self.weights.get(class).map(Vec::as_slice)
    }

    /// Per-class intercepts.
    #[must_use]
    pub fn intercepts(&self) -> &[f64] {
        &self.intercepts
    }

    /// Checks that there is one intercept and one `n_features`-long weight row per class.
    pub fn check_shape(&self) -> Result<(), ModelError> {
        if self.weights.len() != self.intercepts.len() {
            return Err(ModelError::MalformedModel(format!(
                "{} weight rows but {} intercepts",
                self.weights.len(),
                self.intercepts.len()
            )));
        }
        if let Some((class, row)) = self
            .weights
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.n_features)
        {
            return Err(ModelError::MalformedModel(format!(
                "weight row {class} has {} entries, expected {}",
                row.len(),
                self.n_features
            )));
        }
        Ok(())
    }

    /// Raw class scores `W·x + b`.
    pub fn decision_function(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        self.check_shape()?;
        self.check_dim(features)?;
        Ok(self.scores(features))
    }

    /// Softmax class probabilities.
    pub fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        let mut scores = self.decision_function(features)?;
        softmax(&mut scores);
        Ok(scores)
    }

    /// Highest-scoring class index; ties go to the lowest index.
    pub fn predict(&self, features: &FeatureVector) -> Result<usize, ModelError> {
        let scores = self.decision_function(features)?;
        Ok(argmax(&scores))
    }

    /// Objective: mean cross-entropy plus `‖W‖² / (2·C·n)`.
    pub fn loss(
        &self,
        features: &[FeatureVector],
        labels: &[usize],
        c: f64,
    ) -> Result<f64, ModelError> {
        check_inputs(features, labels, self.n_classes())?;
        for x in features {
            self.check_dim(x)?;
        }
        Ok(self.objective(features, labels, c))
    }

    fn check_dim(&self, features: &FeatureVector) -> Result<(), ModelError> {
        if features.dim() != self.n_features {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features,
                got: features.dim(),
            });
        }
        match features.iter().map(|(idx, _)| idx).max() {
            Some(idx) if idx >= self.n_features => Err(ModelError::DimensionMismatch {
                expected: self.n_features,
                got: idx + 1,
            }),
            _ => Ok(()),
        }
    }

    fn scores(&self, features: &FeatureVector) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.intercepts)
            .map(|(row, bias)| {
                features
                    .iter()
                    .map(|(idx, count)| row[idx] * f64::from(count))
                    .sum::<f64>()
                    + bias
            })
            .collect()
    }

    #[allow(clippy::cast_precision_loss)]
    fn objective(&self, features: &[FeatureVector], labels: &[usize], c: f64) -> f64 {
        let n = features.len() as f64;
        let data_loss: f64 = features
            .iter()
            .zip(labels)
            .map(|(x, &label)| {
                let mut probs = self.scores(x);
                softmax(&mut probs);
                -probs[label].max(1e-15).ln()
            })
            .sum::<f64>()
            / n;
        let penalty: f64 = self
            .weights
            .iter()
            .flat_map(|row| row.iter())
            .map(|w| w * w)
            .sum();
        data_loss + penalty / (2.0 * c * n)
    }
}

/// Fits a model with full-batch gradient descent from zero weights.
///
/// Samples are visited in input order, so the result is fully determined by
/// the inputs and the solver settings.
pub fn train(
    features: &[FeatureVector],
    labels: &[usize],
    n_classes: usize,
    config: &SolverConfig,
) -> Result<(LogisticModel, FitSummary), ModelError> {
    config.validate()?;
    check_inputs(features, labels, n_classes)?;
    let n_features = features[0].dim();
    if let Some(bad) = features.iter().find(|x| x.dim() != n_features) {
        return Err(ModelError::DimensionMismatch {
            expected: n_features,
            got: bad.dim(),
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let n = features.len() as f64;
    let l2 = 1.0 / (config.c * n);
    let mut model = LogisticModel::zeros(n_classes, n_features);
    let mut grad_w = vec![vec![0.0; n_features]; n_classes];
    let mut grad_b = vec![0.0; n_classes];
    let mut previous = model.objective(features, labels, config.c);
    let mut summary = FitSummary {
        iterations: 0,
        final_loss: previous,
        converged: false,
    };

    for iteration in 1..=config.max_iter {
        grad_w.iter_mut().for_each(|row| row.fill(0.0));
        grad_b.fill(0.0);
        for (x, &label) in features.iter().zip(labels) {
            let mut probs = model.scores(x);
            softmax(&mut probs);
            for (class, prob) in probs.iter().enumerate() {
                let residual = prob - if class == label { 1.0 } else { 0.0 };
                grad_b[class] += residual;
                for (idx, count) in x.iter() {
                    grad_w[class][idx] += residual * f64::from(count);
                }
            }
        }
        for class in 0..n_classes {
            for (w, g) in model.weights[class].iter_mut().zip(&grad_w[class]) {
                *w -= config.learning_rate * (g / n + l2 * *w);
            }
            model.intercepts[class] -= config.learning_rate * grad_b[class] / n;
        }

        let loss = model.objective(features, labels, config.c);
        summary.iterations = iteration;
        summary.final_loss = loss;
        if (previous - loss).abs() < config.tolerance {
            summary.converged = true;
            break;
        }
        previous = loss;
    }
    Ok((model, summary))
}

fn check_inputs(
    features: &[FeatureVector],
    labels: &[usize],
    n_classes: usize,
) -> Result<(), ModelError> {
    if features.is_empty() {
        return Err(ModelError::EmptyTrainingSet);
    }
    if features.len() != labels.len() {
        return Err(ModelError::LengthMismatch {
            features: features.len(),
            labels: labels.len(),
        });
    }
    if let Some(&label) = labels.iter().find(|&&label| label >= n_classes) {
        return Err(ModelError::LabelOutOfRange {
            label,
            classes: n_classes,
        });
    }
    Ok(())
}

fn softmax(scores: &mut [f64]) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut total = 0.0;
    for score in scores.iter_mut() {
        *score = (*score - max).exp();
        total += *score;
    }
    for score in scores.iter_mut() {
        *score /= total;
    }
}

fn argmax(scores: &[f64]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (idx, &score)| {
            if score > best.1 {
                (idx, score)
            } else {
                best
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (Vec<FeatureVector>, Vec<usize>) {
        // Feature 0 marks class 0, feature 1 class 1, feature 2 class 2.
        let rows: [([u32; 4], usize); 9] = [
            ([2, 0, 0, 1], 0),
            ([1, 0, 0, 0], 0),
            ([3, 0, 0, 1], 0),
            ([0, 2, 0, 1], 1),
            ([0, 1, 0, 0], 1),
            ([0, 3, 0, 0], 1),
            ([0, 0, 1, 1], 2),
            ([0, 0, 2, 0], 2),
            ([0, 0, 1, 0], 2),
        ];
        rows.iter()
            .map(|(dense, label)| (FeatureVector::from_dense(dense), *label))
            .unzip()
    }

    #[test]
    fn learns_separable_classes() {
        let (features, labels) = toy();
        let (model, summary) = train(&features, &labels, 3, &SolverConfig::default()).unwrap();
        assert!(summary.iterations > 0);
        for (x, &label) in features.iter().zip(&labels) {
            assert_eq!(model.predict(x).unwrap(), label);
        }
        let probs = model
            .predict_proba(&FeatureVector::from_dense(&[0, 4, 0, 0]))
            .unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(argmax(&probs), 1);
    }

    #[test]
    fn training_reduces_loss() {
        let (features, labels) = toy();
        let untrained = LogisticModel::zeros(3, 4)
            .loss(&features, &labels, 1.0)
            .unwrap();
        let (model, summary) = train(&features, &labels, 3, &SolverConfig::default()).unwrap();
        assert!((untrained - 3f64.ln()).abs() < 1e-9);
        assert!(summary.final_loss < untrained);
        assert!((model.loss(&features, &labels, 1.0).unwrap() - summary.final_loss).abs() < 1e-12);
    }

    #[test]
    fn fitting_is_deterministic() {
        let (features, labels) = toy();
        let config = SolverConfig {
            max_iter: 50,
            ..SolverConfig::default()
        };
        let (first, _) = train(&features, &labels, 3, &config).unwrap();
        let (second, _) = train(&features, &labels, 3, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_vector_predicts_from_intercepts() {
        let model = LogisticModel::zeros(3, 4);
        let zero = FeatureVector::from_dense(&[0; 4]);
        assert_eq!(model.predict(&zero).unwrap(), 0);
        assert_eq!(model.predict_proba(&zero).unwrap(), vec![1.0 / 3.0; 3]);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let model = LogisticModel::zeros(3, 4);
        let err = model
            .predict(&FeatureVector::from_dense(&[1, 0, 0]))
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::DimensionMismatch {
                expected: 4,
                got: 3
            }
        );
    }

    #[test]
    fn short_weight_rows_are_an_error_not_a_panic() {
        let mut value = serde_json::to_value(LogisticModel::zeros(3, 4)).unwrap();
        for row in value["weights"].as_array_mut().unwrap() {
            row.as_array_mut().unwrap().truncate(1);
        }
        let model: LogisticModel = serde_json::from_value(value).unwrap();
        assert!(matches!(model.check_shape(), Err(ModelError::MalformedModel(_))));
        assert!(matches!(
            model.predict(&FeatureVector::from_dense(&[0, 0, 3, 0])),
            Err(ModelError::MalformedModel(_))
        ));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let (features, labels) = toy();
        let config = SolverConfig::default();
        assert_eq!(
            train(&[], &[], 3, &config).unwrap_err(),
            ModelError::EmptyTrainingSet
        );
        assert!(matches!(
            train(&features, &labels[..2], 3, &config),
            Err(ModelError::LengthMismatch { .. })
        ));
        assert!(matches!(
            train(&features, &labels, 2, &config),
            Err(ModelError::LabelOutOfRange { label: 2, .. })
        ));
        let bad = SolverConfig {
            c: 0.0,
            ..config
        };
        assert!(matches!(
            train(&features, &labels, 3, &bad),
            Err(ModelError::InvalidParameter(_))
        ));
    }
}
