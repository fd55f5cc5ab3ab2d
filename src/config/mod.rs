//! Persistent settings for classification, export and training runs.

mod defaults;
mod io;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use defaults::*;
pub use io::{config_path, load_from_path, load_or_default, save, save_to_path};

/// Default filename used to store the settings.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Model file looked up in the app root when none is configured.
pub const DEFAULT_MODEL_FILE_NAME: &str = "model.json";

/// Errors that may occur while loading or saving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The application directory could not be resolved.
    #[error("No suitable config directory: {0}")]
    AppDir(#[from] crate::app_dirs::AppDirError),
    /// Failed to create the config directory.
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to read the config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to write the config file.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse TOML.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to serialize TOML.
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
}

/// All settings stored in `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub classification: ClassificationSettings,
    #[serde(default)]
    pub publisher: PublisherSettings,
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub training: TrainingSettings,
}

impl AppSettings {
    /// Clamp values that would otherwise stall or overload a run.
    pub fn normalized(mut self) -> Self {
        self.classification.worker_count = clamp_worker_count(self.classification.worker_count);
        self.classification.target_size = self.classification.target_size.max(1);
        self.publisher.throttle_ms = clamp_throttle_ms(self.publisher.throttle_ms);
        self.export.image_size = self.export.image_size.max(1);
        self.training.max_iterations = self.training.max_iterations.max(1);
        self.training.iterations = self.training.iterations.max(1);
        self.training.report_interval = self.training.report_interval.max(1);
        self.training.checkpoint_interval = self.training.checkpoint_interval.max(1);
        self
    }
}

/// Settings for the classification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationSettings {
    /// Maximum in-flight classification jobs; `0` picks a value from the host.
    #[serde(default)]
    pub worker_count: u32,
    /// Edge length in pixels of the image handed to the classifier.
    #[serde(default = "default_target_size")]
    pub target_size: u32,
    /// Label whose probability becomes the record's prediction.
    #[serde(default = "default_positive_label")]
    pub positive_label: String,
    /// Groups whose name contains this text are recorded as memberships.
    #[serde(default = "default_positive_label")]
    pub collection_match: String,
    /// Trained classifier model; defaults to `model.json` in the app root.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        Self {
            worker_count: 0,
            target_size: default_target_size(),
            positive_label: default_positive_label(),
            collection_match: default_positive_label(),
            model_path: None,
        }
    }
}

impl ClassificationSettings {
    /// Resolve the effective concurrency limit.
    ///
    /// Priority: configured value, then `COCOASORT_WORKERS`, then twice the
    /// available parallelism.
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count >= 1 {
            return self.worker_count as usize;
        }
        if let Ok(value) = std::env::var(WORKERS_ENV)
            && let Ok(parsed) = value.trim().parse::<usize>()
            && parsed >= 1
        {
            return parsed.min(MAX_WORKER_COUNT as usize);
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .saturating_mul(2)
    }

    /// Configured model path, or `model.json` in the application root.
    pub fn resolved_model_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.model_path {
            return Ok(path.clone());
        }
        Ok(crate::app_dirs::app_root_dir()?.join(DEFAULT_MODEL_FILE_NAME))
    }
}

/// Settings for the snapshot publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherSettings {
    /// Throttle window in milliseconds.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
        }
    }
}

/// Settings for exporting group members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Names of the groups that are exported; all others are skipped.
    #[serde(default = "default_export_groups")]
    pub groups: Vec<String>,
    /// Edge length in pixels of exported images.
    #[serde(default = "default_export_image_size")]
    pub image_size: u32,
    /// Destination used when none is given on the command line.
    #[serde(default)]
    pub destination_root: Option<PathBuf>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            groups: default_export_groups(),
            image_size: default_export_image_size(),
            destination_root: None,
        }
    }
}

/// Settings for dataset splitting and the training procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Files per label used for training.
    #[serde(default = "default_training_cap")]
    pub training_cap: usize,
    /// Files per label, after the training slice, used for evaluation.
    #[serde(default = "default_evaluation_cap")]
    pub evaluation_cap: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Upper bound on iterations for the whole session.
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default = "default_report_interval")]
    pub report_interval: usize,
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            training_cap: default_training_cap(),
            evaluation_cap: default_evaluation_cap(),
            max_iterations: default_max_iterations(),
            iterations: default_iterations(),
            report_interval: default_report_interval(),
            checkpoint_interval: default_checkpoint_interval(),
        }
    }
}
