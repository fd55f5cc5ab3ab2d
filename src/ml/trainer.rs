use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;

use tracing::{debug, info, warn};

use super::features::image_features;
use super::logreg::{LogRegModel, LogRegState, TrainDataset, TrainOptions};
use super::metrics::{ConfusionMatrix, accuracy};
use crate::training::{HyperParameters, TrainingData, TrainingError, TrainingJob, TrainingProcedure};

/// Intermediate model published every checkpoint interval.
#[derive(Debug, Clone)]
pub struct TrainingCheckpoint {
    pub iteration: usize,
    pub training_accuracy: f32,
    /// `None` when no evaluation files were available.
    pub validation_accuracy: Option<f32>,
    pub model: LogRegModel,
}

/// [`TrainingProcedure`] that fits a [`LogRegModel`] on a dedicated thread.
#[derive(Debug, Clone, Default)]
pub struct LogRegTrainer {
    options: TrainOptions,
}

impl LogRegTrainer {
    pub fn new(options: TrainOptions) -> Self {
        Self { options }
    }
}

impl TrainingProcedure for LogRegTrainer {
    type Checkpoint = TrainingCheckpoint;
    type Model = LogRegModel;

    fn train(
        &self,
        data: TrainingData,
        params: &HyperParameters,
    ) -> Result<TrainingJob<TrainingCheckpoint, LogRegModel>, TrainingError> {
        let (progress_tx, progress) = mpsc::channel();
        let (checkpoint_tx, checkpoints) = mpsc::channel();
        let (result_tx, result) = mpsc::channel();
        let options = self.options.clone();
        let params = *params;
        thread::Builder::new()
            .name("logreg-trainer".into())
            .spawn(move || {
                let outcome = run_training(&data, &params, &options, &progress_tx, &checkpoint_tx);
                if let Err(err) = &outcome {
                    warn!("Training failed: {err}");
                }
                let _ = result_tx.send(outcome);
            })
            .map_err(|err| TrainingError::Spawn(Arc::new(err)))?;
        Ok(TrainingJob {
            progress,
            checkpoints,
            result,
        })
    }
}

fn run_training(
    data: &TrainingData,
    params: &HyperParameters,
    options: &TrainOptions,
    progress: &Sender<f64>,
    checkpoints: &Sender<TrainingCheckpoint>,
) -> Result<LogRegModel, TrainingError> {
    let classes: Vec<String> = data.labels().into_iter().map(str::to_string).collect();
    let training = load_dataset(&classes, data, |split| &split.training);
    let evaluation = load_dataset(&classes, data, |split| &split.evaluation);
    info!(
        "Extracted features: {} training, {} evaluation",
        training.x.len(),
        evaluation.x.len()
    );
    let mut state = LogRegState::new(&training, options).map_err(TrainingError::Procedure)?;
    let total = params.effective_iterations();
    for iteration in 1..=total {
        state.epoch(&training);
        if iteration % params.report_interval == 0 || iteration == total {
            let _ = progress.send(iteration as f64 / total as f64);
        }
        if iteration % params.checkpoint_interval == 0 {
            let checkpoint = TrainingCheckpoint {
                iteration,
                training_accuracy: evaluate(state.model(), &training),
                validation_accuracy: (!evaluation.x.is_empty())
                    .then(|| evaluate(state.model(), &evaluation)),
                model: state.model().clone(),
            };
            debug!(
                "Checkpoint {iteration}: train={:.3} validation={:?}",
                checkpoint.training_accuracy, checkpoint.validation_accuracy
            );
            let _ = checkpoints.send(checkpoint);
        }
    }
    let model = state.into_model();
    model.validate().map_err(TrainingError::Procedure)?;
    Ok(model)
}

fn load_dataset(
    classes: &[String],
    data: &TrainingData,
    files: impl Fn(&crate::training::TrainingSplit) -> &Vec<PathBuf>,
) -> TrainDataset {
    let mut dataset = TrainDataset {
        classes: classes.to_vec(),
        ..TrainDataset::default()
    };
    for (label, split) in data.splits.iter().enumerate() {
        for path in files(split) {
            match image::open(path) {
                Ok(image) => {
                    dataset.x.push(image_features(&image));
                    dataset.y.push(label);
                }
                Err(err) => warn!("Skipping {}: {err}", path.display()),
            }
        }
    }
    dataset
}

/// Accuracy of `model` on `dataset`.
pub(crate) fn evaluate(model: &LogRegModel, dataset: &TrainDataset) -> f32 {
    let mut cm = ConfusionMatrix::new(model.classes.len());
    for (x, &y) in dataset.x.iter().zip(&dataset.y) {
        cm.add(y, model.predict_class_index(x));
    }
    accuracy(&cm)
}
