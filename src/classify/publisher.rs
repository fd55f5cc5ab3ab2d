use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use super::JobCompletion;
use crate::records::{JobOutcome, Record, Snapshot};

/// Fans throttled full-list snapshots out to subscribers.
///
/// Completions are merged into the publisher's own copy of the records as
/// they arrive. The first completion after a quiet period opens a window;
/// when the window closes the latest merged state is emitted once, even if
/// nothing else arrived.
#[derive(Clone)]
pub struct SnapshotPublisher {
    subscribers: Arc<Mutex<Vec<Sender<Snapshot>>>>,
    latest: Arc<Mutex<Option<Snapshot>>>,
    sequence: Arc<AtomicU64>,
    window: Duration,
}

impl SnapshotPublisher {
    pub fn new(window: Duration) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            latest: Arc::new(Mutex::new(None)),
            sequence: Arc::new(AtomicU64::new(0)),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Register an observer; it receives every snapshot published from now on.
    pub fn subscribe(&self) -> Receiver<Snapshot> {
        let (tx, rx) = mpsc::channel();
        self.lock_subscribers().push(tx);
        rx
    }

    /// The most recently emitted snapshot.
    pub fn latest(&self) -> Option<Snapshot> {
        self.latest
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    /// Emit `records` immediately, bypassing the throttle.
    pub fn publish_now(&self, records: Vec<Record>) -> u64 {
        self.emit(records.into())
    }

    /// Start merging `completions` into `initial` on a background thread.
    ///
    /// The thread ends after the completion channel closes and any pending
    /// state has been emitted. It returns the number of emissions.
    pub fn spawn(
        &self,
        initial: Vec<Record>,
        completions: Receiver<JobCompletion>,
    ) -> std::io::Result<JoinHandle<usize>> {
        let publisher = self.clone();
        thread::Builder::new()
            .name("snapshot-publisher".into())
            .spawn(move || publisher.run(initial, completions))
    }

    /// Trailing-edge throttle loop.
    pub(super) fn run(&self, mut current: Vec<Record>, completions: Receiver<JobCompletion>) -> usize {
        let mut emissions = 0usize;
        // Blocks while idle; a closed channel ends the loop.
        while let Ok(first) = completions.recv() {
            merge(&mut current, first);
            let deadline = Instant::now() + self.window;
            let mut closed = false;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                match completions.recv_timeout(deadline - now) {
                    Ok(completion) => merge(&mut current, completion),
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
            self.emit(current.as_slice().into());
            emissions += 1;
            if closed {
                break;
            }
        }
        debug!("Snapshot publisher finished after {emissions} emissions");
        emissions
    }

    fn emit(&self, records: Arc<[Record]>) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = Snapshot { sequence, records };
        *self.latest.lock().unwrap_or_else(|err| err.into_inner()) = Some(snapshot.clone());
        self.lock_subscribers()
            .retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
        sequence
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Sender<Snapshot>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }
}

fn merge(records: &mut [Record], completion: JobCompletion) {
    let Some(record) = records.get_mut(completion.index) else {
        return;
    };
    if record.id != completion.record_id {
        return;
    }
    match completion.outcome {
        JobOutcome::Classified(score) => {
            if record.prediction.is_none() {
                record.prediction = Some(score);
            }
            record.failure = None;
        }
        JobOutcome::Failed(reason) => {
            if record.prediction.is_none() {
                record.failure = Some(reason);
            }
        }
    }
}
