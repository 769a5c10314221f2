use crate::config::{TrainingConfig, MAX_EPOCHS};
use crate::models::ColorSample;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Number of input features (R, G, B).
pub const FEATURE_DIM: usize = 3;

/// Clipping applied to probabilities before taking logs.
const LOG_EPSILON: f64 = 1e-15;

/// Multinomial logistic regression over RGB colors.
///
/// One weight row per class; classes are the distinct training labels in
/// ascending order. Inputs are scaled from 0..=255 to [-1, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    classes: Vec<i64>,
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl LogisticModel {
    /// Zero-initialized model for the given (sorted, distinct) classes
    pub fn new(classes: Vec<i64>) -> Self {
        let k = classes.len();
        Self {
            classes,
            weights: Array2::zeros((k, FEATURE_DIM)),
            bias: Array1::zeros(k),
        }
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// n x FEATURE_DIM design matrix
    pub fn design_matrix(samples: &[ColorSample]) -> Array2<f64> {
        let mut x = Array2::zeros((samples.len(), FEATURE_DIM));
        for (mut row, sample) in x.axis_iter_mut(Axis(0)).zip(samples) {
            for (dst, v) in row.iter_mut().zip(sample.features()) {
                *dst = v;
            }
        }
        x
    }

    /// n x K matrix of class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut logits = x.dot(&self.weights.t()) + &self.bias;
        for mut row in logits.axis_iter_mut(Axis(0)) {
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let total = row.sum();
            row.mapv_inplace(|v| v / total);
        }
        logits
    }

    /// Predicted label per row; ties go to the smaller label.
    pub fn predict_matrix(&self, x: &Array2<f64>) -> Vec<i64> {
        self.predict_proba(x)
            .axis_iter(Axis(0))
            .map(|row| {
                let mut best = 0;
                for (idx, &p) in row.iter().enumerate() {
                    if p > row[best] {
                        best = idx;
                    }
                }
                self.classes[best]
            })
            .collect()
    }

    pub fn predict(&self, samples: &[ColorSample]) -> Vec<i64> {
        if samples.is_empty() {
            return Vec::new();
        }
        self.predict_matrix(&Self::design_matrix(samples))
    }

    /// One full-batch gradient step on the L2-regularized cross-entropy.
    ///
    /// `targets` holds class indices (positions in `classes`), one per row of `x`.
    pub fn partial_fit(&mut self, x: &Array2<f64>, targets: &[usize], learning_rate: f64, l2_penalty: f64) {
        let n = x.nrows() as f64;
        let mut diff = self.predict_proba(x);
        for (mut row, &t) in diff.axis_iter_mut(Axis(0)).zip(targets) {
            row[t] -= 1.0;
        }

        let grad_w = diff.t().dot(x) / n + &self.weights * l2_penalty;
        let grad_b = diff.sum_axis(Axis(0)) / n;

        self.weights.scaled_add(-learning_rate, &grad_w);
        self.bias.scaled_add(-learning_rate, &grad_b);
    }
}

/// Mean negative log-likelihood of the true classes
pub fn log_loss(proba: &Array2<f64>, targets: &[usize]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let total: f64 = proba
        .axis_iter(Axis(0))
        .zip(targets)
        .map(|(row, &t)| -row[t].clamp(LOG_EPSILON, 1.0 - LOG_EPSILON).ln())
        .sum();
    total / targets.len() as f64
}

/// Fit a fresh model with `config.epochs` passes over the whole training set,
/// recording the loss after each pass.
///
/// Callers are expected to have validated that `samples` and `labels` line up
/// and that there are at least two distinct labels.
pub fn train_incremental(samples: &[ColorSample], labels: &[i64], config: &TrainingConfig) -> (LogisticModel, Vec<f64>) {
    let mut classes = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();

    let targets: Vec<usize> = labels
        .iter()
        .map(|label| classes.binary_search(label).unwrap_or_default())
        .collect();

    let x = LogisticModel::design_matrix(samples);
    let mut model = LogisticModel::new(classes);
    let mut losses = Vec::with_capacity(config.epochs.min(MAX_EPOCHS));

    for epoch in 0..config.epochs {
        let _span = tracing::debug_span!("epoch", epoch = epoch + 1).entered();
        model.partial_fit(&x, &targets, config.learning_rate, config.l2_penalty);
        let loss = log_loss(&model.predict_proba(&x), &targets);
        tracing::debug!("Epoch {}/{}: loss={:.6}", epoch + 1, config.epochs, loss);
        losses.push(loss);
    }

    (model, losses)
}
