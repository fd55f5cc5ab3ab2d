use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::thread;

use tracing::{debug, info, warn};

use super::semaphore::Semaphore;
use super::{Classifier, JobCompletion};
use crate::library::{AssetSource, ImageRequest};
use crate::logging::panic_to_string;
use crate::records::{JobOutcome, Record, WorkingCopy};

/// Parameters of one scheduler run.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Maximum jobs in flight.
    pub concurrency: usize,
    /// Rendition requested for every item.
    pub request: ImageRequest,
}

/// Counters reported when a run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Jobs that were given a worker slot.
    pub admitted: usize,
    /// Image requests that produced pixels.
    pub received: usize,
    pub classified: usize,
    pub failed: usize,
    /// True when the stop flag ended admission early.
    pub stopped: bool,
}

#[derive(Debug, Default)]
struct RunCounters {
    admitted: AtomicUsize,
    received: AtomicUsize,
    classified: AtomicUsize,
    failed: AtomicUsize,
}

impl RunCounters {
    fn stats(&self, stopped: bool) -> RunStats {
        RunStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            classified: self.classified.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stopped,
        }
    }
}

/// Everything a job needs, owned by a single run and borrowed by its jobs.
struct RunContext<'a> {
    working: &'a WorkingCopy,
    source: &'a dyn AssetSource,
    classifier: &'a dyn Classifier,
    completions: Sender<JobCompletion>,
    request: ImageRequest,
    counters: RunCounters,
}

/// Classify every pending record of `working`, at most
/// `options.concurrency` at a time.
///
/// Records are admitted in index order. The stop flag is checked before each
/// admission; jobs already admitted always run to completion. Returns once
/// every admitted job has finished.
pub(super) fn run(
    working: &WorkingCopy,
    source: &dyn AssetSource,
    classifier: &dyn Classifier,
    stop: &AtomicBool,
    completions: Sender<JobCompletion>,
    options: SchedulerOptions,
) -> RunStats {
    let semaphore = Semaphore::new(options.concurrency);
    let context = RunContext {
        working,
        source,
        classifier,
        completions,
        request: options.request,
        counters: RunCounters::default(),
    };
    info!(
        "Classification run started: {} pending of {}, concurrency {}",
        working.pending_count(),
        working.len(),
        semaphore.capacity()
    );
    let mut stopped = false;
    thread::scope(|scope| {
        for index in 0..working.len() {
            if !working.is_pending(index) {
                continue;
            }
            if stop.load(Ordering::Relaxed) {
                stopped = true;
                break;
            }
            let permit = semaphore.acquire();
            if stop.load(Ordering::Relaxed) {
                stopped = true;
                break;
            }
            context.counters.admitted.fetch_add(1, Ordering::Relaxed);
            let context = &context;
            let spawned = thread::Builder::new()
                .name(format!("classify-{index}"))
                .spawn_scoped(scope, move || {
                    let _permit = permit;
                    context.run_job(index);
                });
            if let Err(err) = spawned {
                context.finish(index, JobOutcome::Failed(format!("Worker spawn failed: {err}")));
            }
        }
    });
    let stats = context.counters.stats(stopped);
    info!(
        "Classification run finished: admitted={} received={} classified={} failed={} stopped={}",
        stats.admitted, stats.received, stats.classified, stats.failed, stats.stopped
    );
    stats
}

impl RunContext<'_> {
    fn run_job(&self, index: usize) {
        let Some(record) = self.working.base(index) else {
            return;
        };
        debug!("Classifying {}", record.asset);
        let outcome = catch_unwind(AssertUnwindSafe(|| self.classify(record)))
            .unwrap_or_else(|payload| {
                Err(format!(
                    "Classification worker panicked: {}",
                    panic_to_string(payload)
                ))
            });
        let outcome = match outcome {
            Ok(score) => JobOutcome::Classified(score),
            Err(reason) => JobOutcome::Failed(reason),
        };
        self.finish(index, outcome);
    }

    fn classify(&self, record: &Record) -> Result<f64, String> {
        let image = self
            .source
            .fetch_image(&record.asset, self.request)
            .map_err(|err| err.to_string())?;
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        let score = self
            .classifier
            .classify(&image)
            .map_err(|err| err.to_string())?;
        if !score.is_finite() {
            return Err(format!("Classifier returned non-finite score {score}"));
        }
        Ok(score)
    }

    fn finish(&self, index: usize, outcome: JobOutcome) {
        let Some(record) = self.working.base(index) else {
            return;
        };
        let outcome = outcome.normalized();
        match &outcome {
            JobOutcome::Classified(_) => {
                self.counters.classified.fetch_add(1, Ordering::Relaxed);
            }
            JobOutcome::Failed(reason) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Classification failed for {}: {reason}", record.asset);
            }
        }
        if self.working.record(index, outcome.clone()) {
            let _ = self.completions.send(JobCompletion {
                index,
                record_id: record.id,
                outcome,
            });
        }
    }
}
