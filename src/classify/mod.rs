//! Bounded-concurrency classification of loaded records.
//!
//! [`ClassificationSession`] is the entry point: it loads records from an
//! [`AssetSource`](crate::library::AssetSource), runs the scheduler on a
//! background thread and publishes throttled snapshots to subscribers.

mod publisher;
mod scheduler;
mod semaphore;
mod session;

use image::DynamicImage;
use thiserror::Error;

use crate::records::{JobOutcome, RecordId};

pub use publisher::SnapshotPublisher;
pub use scheduler::{RunStats, SchedulerOptions};
pub use semaphore::{Permit, Semaphore};
pub use session::{ClassificationSession, SessionError, SessionOptions, SessionState};

/// Errors produced by a classifier for a single image.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Classifier rejected input: {0}")]
    InvalidInput(String),
    #[error("Classifier failed: {0}")]
    Inference(String),
}

/// Single-image inference producing a score in `[0, 1]`.
///
/// Calls are CPU-bound and block the worker thread for their duration.
pub trait Classifier: Send + Sync {
    fn classify(&self, image: &DynamicImage) -> Result<f64, ClassifyError>;
}

impl<F> Classifier for F
where
    F: Fn(&DynamicImage) -> Result<f64, ClassifyError> + Send + Sync,
{
    fn classify(&self, image: &DynamicImage) -> Result<f64, ClassifyError> {
        self(image)
    }
}

/// Notification sent by a worker once its job wrote an outcome.
#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub index: usize,
    pub record_id: RecordId,
    pub outcome: JobOutcome,
}
