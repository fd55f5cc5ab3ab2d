//! Logistic regression classifier for image color features.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::features::{FEATURE_DIM, FEATURE_KIND, image_features};
use super::softmax;
use crate::classify::{Classifier, ClassifyError};

mod train;
pub use train::{LogRegState, TrainDataset, TrainOptions, train_logreg};

/// Current model file format.
pub const MODEL_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to read model {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write model {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid model JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to encode model: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Invalid model: {0}")]
    Invalid(String),
    #[error("Model has no class named {0}")]
    UnknownLabel(String),
}

/// Versioned logistic regression model over [`image_features`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRegModel {
    pub model_version: i64,
    pub feature_kind: String,
    pub feature_dim: usize,
    pub classes: Vec<String>,
    /// Row-major `[class][feature]`.
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    pub temperature: f32,
}

impl LogRegModel {
    /// Model with zero weights for `classes`; predicts a uniform distribution.
    pub fn zeroed(classes: Vec<String>) -> Self {
        Self {
            model_version: MODEL_VERSION,
            feature_kind: FEATURE_KIND.to_string(),
            feature_dim: FEATURE_DIM,
            weights: vec![0.0; FEATURE_DIM * classes.len()],
            bias: vec![0.0; classes.len()],
            classes,
            temperature: 1.0,
        }
    }

    /// Validate the model dimensions and feature compatibility.
    pub fn validate(&self) -> Result<(), String> {
        if self.feature_kind != FEATURE_KIND {
            return Err(format!(
                "Unsupported feature_kind {} (expected {})",
                self.feature_kind, FEATURE_KIND
            ));
        }
        if self.feature_dim != FEATURE_DIM {
            return Err(format!(
                "Unsupported feature_dim {} (expected {})",
                self.feature_dim, FEATURE_DIM
            ));
        }
        let classes = self.classes.len();
        if classes == 0 {
            return Err("No classes defined".to_string());
        }
        if self.weights.len() != classes * self.feature_dim {
            return Err("weights length mismatch".to_string());
        }
        if self.bias.len() != classes {
            return Err("bias length mismatch".to_string());
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err("temperature must be > 0".to_string());
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let bytes = fs::read(path).map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let model: Self = serde_json::from_slice(&bytes).map_err(|source| ModelError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        model.validate().map_err(ModelError::Invalid)?;
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let json = serde_json::to_vec_pretty(self)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| ModelError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| ModelError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn class_index(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|class| class == label)
    }

    pub(crate) fn logits(&self, features: &[f32]) -> Vec<f32> {
        let temp = self.temperature.max(1e-6);
        (0..self.classes.len())
            .map(|c| {
                let row = &self.weights[c * self.feature_dim..(c + 1) * self.feature_dim];
                let sum: f32 = row.iter().zip(features).map(|(w, x)| w * x).sum();
                (sum + self.bias[c]) / temp
            })
            .collect()
    }

    /// Compute class probabilities for a single feature vector.
    pub fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        if features.len() != self.feature_dim || self.classes.is_empty() {
            return Vec::new();
        }
        softmax(&self.logits(features))
    }

    /// Return the argmax class index for the given feature vector.
    pub fn predict_class_index(&self, features: &[f32]) -> usize {
        super::argmax(&self.predict_proba(features))
    }
}

/// [`Classifier`] scoring the probability of one label of a [`LogRegModel`].
#[derive(Debug, Clone)]
pub struct LogRegClassifier {
    model: LogRegModel,
    positive: usize,
}

impl LogRegClassifier {
    pub fn new(model: LogRegModel, positive_label: &str) -> Result<Self, ModelError> {
        model.validate().map_err(ModelError::Invalid)?;
        let positive = model
            .class_index(positive_label)
            .ok_or_else(|| ModelError::UnknownLabel(positive_label.to_string()))?;
        Ok(Self { model, positive })
    }

    pub fn load(path: &Path, positive_label: &str) -> Result<Self, ModelError> {
        Self::new(LogRegModel::load(path)?, positive_label)
    }

    pub fn model(&self) -> &LogRegModel {
        &self.model
    }
}

impl Classifier for LogRegClassifier {
    fn classify(&self, image: &DynamicImage) -> Result<f64, ClassifyError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ClassifyError::InvalidInput("empty image".to_string()));
        }
        let proba = self.model.predict_proba(&image_features(image));
        proba
            .get(self.positive)
            .map(|p| f64::from(*p))
            .ok_or_else(|| ClassifyError::Inference("model produced no probabilities".to_string()))
    }
}
