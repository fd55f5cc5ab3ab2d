//! Dataset splitting and orchestration of a long-running training procedure.
//!
//! A dataset root holds one directory per label. Each label's image files are
//! shuffled and cut into a training and an evaluation slice, handed to a
//! [`TrainingProcedure`], and the procedure's progress, checkpoint and result
//! channels are relayed to observers through a [`TrainingRun`].

mod relay;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;

use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::TrainingSettings;
use crate::library::{is_hidden, is_image_file};

pub use relay::EventRelay;

#[derive(Debug, Clone, Error)]
pub enum TrainingError {
    #[error("Failed to read dataset directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: Arc<std::io::Error>,
    },
    #[error("Dataset {0} contains no labels")]
    NoLabels(PathBuf),
    #[error("Failed to spawn training thread: {0}")]
    Spawn(Arc<std::io::Error>),
    #[error("Training failed: {0}")]
    Procedure(String),
}

impl TrainingError {
    fn read_dir(path: &Path, source: std::io::Error) -> Self {
        Self::ReadDir {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }
}

/// Per-label slice sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitCaps {
    pub training: usize,
    pub evaluation: usize,
}

impl SplitCaps {
    pub fn from_settings(settings: &TrainingSettings) -> Self {
        Self {
            training: settings.training_cap,
            evaluation: settings.evaluation_cap,
        }
    }
}

/// Training and evaluation files of one label; the two lists are disjoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSplit {
    pub label: String,
    pub training: Vec<PathBuf>,
    pub evaluation: Vec<PathBuf>,
}

/// Input handed to a [`TrainingProcedure`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainingData {
    pub splits: Vec<TrainingSplit>,
}

impl TrainingData {
    pub fn labels(&self) -> Vec<&str> {
        self.splits.iter().map(|split| split.label.as_str()).collect()
    }

    pub fn training_len(&self) -> usize {
        self.splits.iter().map(|split| split.training.len()).sum()
    }

    pub fn evaluation_len(&self) -> usize {
        self.splits.iter().map(|split| split.evaluation.len()).sum()
    }
}

/// Fixed parameters of a training session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HyperParameters {
    /// Iterations the model trains for.
    pub max_iterations: usize,
    /// Session-wide cap on iterations.
    pub iterations: usize,
    /// Iterations between progress reports.
    pub report_interval: usize,
    /// Iterations between checkpoints.
    pub checkpoint_interval: usize,
}

impl HyperParameters {
    pub fn from_settings(settings: &TrainingSettings) -> Self {
        Self {
            max_iterations: settings.max_iterations.max(1),
            iterations: settings.iterations.max(1),
            report_interval: settings.report_interval.max(1),
            checkpoint_interval: settings.checkpoint_interval.max(1),
        }
    }

    /// Number of iterations a procedure should actually run.
    pub fn effective_iterations(&self) -> usize {
        self.max_iterations.min(self.iterations).max(1)
    }
}

impl Default for HyperParameters {
    fn default() -> Self {
        Self::from_settings(&TrainingSettings::default())
    }
}

/// Channels of a started training procedure.
///
/// The procedure sends any number of progress fractions and checkpoints and
/// then exactly one result before dropping its senders.
pub struct TrainingJob<C, M> {
    pub progress: Receiver<f64>,
    pub checkpoints: Receiver<C>,
    pub result: Receiver<Result<M, TrainingError>>,
}

/// Long-running bulk training, started from prepared splits.
///
/// `train` must return promptly; the work runs on threads owned by the
/// procedure and is observed only through the returned channels.
pub trait TrainingProcedure: Send + Sync {
    type Checkpoint: Clone + Send + 'static;
    type Model: Clone + Send + 'static;

    fn train(
        &self,
        data: TrainingData,
        params: &HyperParameters,
    ) -> Result<TrainingJob<Self::Checkpoint, Self::Model>, TrainingError>;
}

/// Immediate subdirectories of `root` that name labels, sorted.
pub fn list_labels(root: &Path) -> Result<Vec<String>, TrainingError> {
    let mut labels = Vec::new();
    for entry in fs::read_dir(root).map_err(|err| TrainingError::read_dir(root, err))? {
        let entry = entry.map_err(|err| TrainingError::read_dir(root, err))?;
        let path = entry.path();
        if path.is_dir() && !is_hidden(&path) {
            labels.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    labels.sort();
    Ok(labels)
}

/// Image files directly inside `dir`, sorted; nested directories are not
/// descended into.
pub fn list_label_files(dir: &Path) -> Result<Vec<PathBuf>, TrainingError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| TrainingError::read_dir(dir, err))? {
        let entry = entry.map_err(|err| TrainingError::read_dir(dir, err))?;
        let path = entry.path();
        if !is_hidden(&path) && is_image_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Shuffle `files` and take the first `caps.training` for training and the
/// following `caps.evaluation` for evaluation.
pub fn split_label_files(
    label: &str,
    mut files: Vec<PathBuf>,
    caps: SplitCaps,
    rng: &mut impl Rng,
) -> TrainingSplit {
    files.shuffle(rng);
    let training_len = files.len().min(caps.training);
    let evaluation_len = (files.len() - training_len).min(caps.evaluation);
    let mut rest = files.split_off(training_len);
    rest.truncate(evaluation_len);
    TrainingSplit {
        label: label.to_string(),
        training: files,
        evaluation: rest,
    }
}

/// Build the splits for every label below `root`.
pub fn prepare_dataset(
    root: &Path,
    caps: SplitCaps,
    rng: &mut impl Rng,
) -> Result<TrainingData, TrainingError> {
    let mut splits = Vec::new();
    for label in list_labels(root)? {
        let files = list_label_files(&root.join(&label))?;
        let split = split_label_files(&label, files, caps, rng);
        info!(
            "Label {}: {} training, {} evaluation",
            split.label,
            split.training.len(),
            split.evaluation.len()
        );
        splits.push(split);
    }
    Ok(TrainingData { splits })
}

/// Observable state of a started training procedure.
pub struct TrainingRun<C, M> {
    progress: EventRelay<f64>,
    checkpoints: EventRelay<C>,
    result: EventRelay<Result<M, TrainingError>>,
    forwarders: Vec<JoinHandle<()>>,
}

impl<C, M> TrainingRun<C, M>
where
    C: Clone + Send + 'static,
    M: Clone + Send + 'static,
{
    fn start(job: TrainingJob<C, M>) -> Result<Self, TrainingError> {
        let progress = EventRelay::buffered();
        let checkpoints = EventRelay::buffered();
        let result = EventRelay::replaying();
        let spawn_error = |err| TrainingError::Spawn(Arc::new(err));
        let forwarders = vec![
            progress
                .forward(job.progress, "training-progress")
                .map_err(spawn_error)?,
            checkpoints
                .forward(job.checkpoints, "training-checkpoints")
                .map_err(spawn_error)?,
            result
                .forward(job.result, "training-result")
                .map_err(spawn_error)?,
        ];
        Ok(Self {
            progress,
            checkpoints,
            result,
            forwarders,
        })
    }

    /// Progress fractions in `[0, 1]`.
    ///
    /// The first subscriber also receives everything published before it
    /// subscribed; later subscribers see events from their subscription on.
    pub fn subscribe_progress(&self) -> Receiver<f64> {
        self.progress.subscribe()
    }

    /// Checkpoints, buffered for the first subscriber like progress.
    pub fn subscribe_checkpoints(&self) -> Receiver<C> {
        self.checkpoints.subscribe()
    }

    /// The terminal result; replayed if it was already published.
    pub fn subscribe_result(&self) -> Receiver<Result<M, TrainingError>> {
        self.result.subscribe()
    }

    /// Block until the procedure closed all channels and return its result.
    pub fn wait(self) -> Result<M, TrainingError> {
        for forwarder in self.forwarders {
            if forwarder.join().is_err() {
                warn!("Training relay thread panicked");
            }
        }
        self.result.last().unwrap_or_else(|| {
            Err(TrainingError::Procedure(
                "procedure ended without a result".to_string(),
            ))
        })
    }
}

/// Prepares splits and starts a [`TrainingProcedure`] on them.
pub struct TrainingOrchestrator<P> {
    procedure: P,
    caps: SplitCaps,
    params: HyperParameters,
}

impl<P: TrainingProcedure> TrainingOrchestrator<P> {
    pub fn new(procedure: P, caps: SplitCaps, params: HyperParameters) -> Self {
        Self {
            procedure,
            caps,
            params,
        }
    }

    pub fn from_settings(procedure: P, settings: &TrainingSettings) -> Self {
        Self::new(
            procedure,
            SplitCaps::from_settings(settings),
            HyperParameters::from_settings(settings),
        )
    }

    /// Split the dataset below `root` and start training.
    ///
    /// Dataset errors are returned before the procedure is invoked.
    pub fn train(
        &self,
        root: &Path,
    ) -> Result<TrainingRun<P::Checkpoint, P::Model>, TrainingError> {
        let data = prepare_dataset(root, self.caps, &mut rand::rng())?;
        if data.splits.is_empty() {
            return Err(TrainingError::NoLabels(root.to_path_buf()));
        }
        info!(
            "Starting training on {} labels ({} training, {} evaluation files)",
            data.splits.len(),
            data.training_len(),
            data.evaluation_len()
        );
        let job = self.procedure.train(data, &self.params)?;
        TrainingRun::start(job)
    }
}

#[cfg(test)]
mod tests;
