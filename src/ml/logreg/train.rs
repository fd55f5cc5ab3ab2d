use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, seq::SliceRandom};

use super::LogRegModel;
use crate::ml::features::FEATURE_DIM;
use crate::ml::softmax;

/// Training options for the logistic regression head.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub learning_rate: f32,
    pub l2: f32,
    pub batch_size: usize,
    pub seed: u64,
    pub balance_classes: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            l2: 1e-4,
            batch_size: 32,
            seed: 42,
            balance_classes: true,
        }
    }
}

/// In-memory training dataset for logreg models.
#[derive(Debug, Clone, Default)]
pub struct TrainDataset {
    pub classes: Vec<String>,
    pub x: Vec<Vec<f32>>,
    pub y: Vec<usize>,
}

impl TrainDataset {
    fn validate(&self) -> Result<(), String> {
        if self.x.is_empty() || self.y.is_empty() {
            return Err("Empty training set".to_string());
        }
        if self.x.len() != self.y.len() {
            return Err("Mismatched training inputs/labels".to_string());
        }
        if self.classes.is_empty() {
            return Err("No classes available for training".to_string());
        }
        if let Some(row) = self.x.iter().find(|row| row.len() != FEATURE_DIM) {
            return Err(format!(
                "Unexpected feature dimension {} (expected {})",
                row.len(),
                FEATURE_DIM
            ));
        }
        Ok(())
    }
}

/// Model being trained one epoch at a time.
pub struct LogRegState {
    model: LogRegModel,
    options: TrainOptions,
    class_weights: Vec<f32>,
    indices: Vec<usize>,
    rng: StdRng,
}

impl LogRegState {
    pub fn new(dataset: &TrainDataset, options: &TrainOptions) -> Result<Self, String> {
        dataset.validate()?;
        let classes = dataset.classes.len();
        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut model = LogRegModel::zeroed(dataset.classes.clone());
        for w in &mut model.weights {
            *w = (rng.random::<f32>() - 0.5) * 0.01;
        }
        let class_weights = if options.balance_classes {
            let mut counts = vec![0f32; classes];
            for &y in &dataset.y {
                if y < classes {
                    counts[y] += 1.0;
                }
            }
            let total: f32 = counts.iter().sum();
            counts
                .into_iter()
                .map(|count| {
                    if count == 0.0 {
                        0.0
                    } else {
                        total / (classes as f32 * count)
                    }
                })
                .collect()
        } else {
            vec![1.0; classes]
        };
        Ok(Self {
            model,
            options: options.clone(),
            class_weights,
            indices: (0..dataset.x.len()).collect(),
            rng,
        })
    }

    pub fn model(&self) -> &LogRegModel {
        &self.model
    }

    pub fn into_model(self) -> LogRegModel {
        self.model
    }

    /// One pass of mini-batch gradient descent over `dataset`.
    pub fn epoch(&mut self, dataset: &TrainDataset) {
        let classes = self.model.classes.len();
        let dim = self.model.feature_dim;
        let lr = self.options.learning_rate;
        let l2 = self.options.l2.max(0.0);
        self.indices.shuffle(&mut self.rng);
        for chunk in self.indices.chunks(self.options.batch_size.max(1)) {
            let mut grad_w = vec![0.0f32; self.model.weights.len()];
            let mut grad_b = vec![0.0f32; classes];
            let mut batch_weight = 0.0f32;
            for &idx in chunk {
                let x = &dataset.x[idx];
                let y = dataset.y[idx];
                let Some(&weight) = self.class_weights.get(y) else {
                    continue;
                };
                if weight == 0.0 {
                    continue;
                }
                let probs = softmax(&self.model.logits(x));
                for c in 0..classes {
                    let diff = probs[c] - if c == y { 1.0 } else { 0.0 };
                    let base = c * dim;
                    for i in 0..dim {
                        grad_w[base + i] += diff * x[i] * weight;
                    }
                    grad_b[c] += diff * weight;
                }
                batch_weight += weight;
            }
            if batch_weight == 0.0 {
                continue;
            }
            let inv = 1.0 / batch_weight;
            for (idx, w) in self.model.weights.iter_mut().enumerate() {
                *w -= lr * (grad_w[idx] * inv + l2 * *w);
            }
            for (c, b) in self.model.bias.iter_mut().enumerate() {
                *b -= lr * grad_b[c] * inv;
            }
        }
    }
}

/// Train for `epochs` passes and return the validated model.
pub fn train_logreg(
    dataset: &TrainDataset,
    options: &TrainOptions,
    epochs: usize,
) -> Result<LogRegModel, String> {
    let mut state = LogRegState::new(dataset, options)?;
    for _ in 0..epochs {
        state.epoch(dataset);
    }
    let model = state.into_model();
    model.validate()?;
    Ok(model)
}
