//! Reference classifier and training procedure.
//!
//! A softmax logistic regression over a small color-histogram feature vector.
//! It is deliberately simple; the pipeline only relies on the
//! [`Classifier`](crate::classify::Classifier) and
//! [`TrainingProcedure`](crate::training::TrainingProcedure) seams.

pub mod features;
pub mod logreg;
pub mod metrics;
mod trainer;

pub use logreg::{LogRegClassifier, LogRegModel, ModelError};
pub use trainer::{LogRegTrainer, TrainingCheckpoint};

/// Compute a numerically-stable softmax for a set of logits.
pub fn softmax(raw: &[f32]) -> Vec<f32> {
    if raw.is_empty() {
        return Vec::new();
    }
    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = raw.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![1.0 / raw.len() as f32; raw.len()];
    }
    exps.into_iter().map(|v| v / sum).collect()
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &value) in values.iter().enumerate() {
        if value > best_val {
            best_val = value;
            best = idx;
        }
    }
    best
}
