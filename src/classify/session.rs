use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::publisher::SnapshotPublisher;
use super::scheduler::{self, RunStats, SchedulerOptions};
use super::Classifier;
use crate::config::AppSettings;
use crate::library::{AssetError, AssetSource, ContentFit, DeliveryMode, ImageRequest};
use crate::logging::panic_to_string;
use crate::records::{Record, RecordStore, Snapshot, WorkingCopy};

/// Errors returned by session control calls.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Library enumeration failed: {0}")]
    Library(#[from] AssetError),
    #[error("A classification run is still active")]
    Busy,
    #[error("No records loaded; call load first")]
    NotLoaded,
    #[error("Failed to spawn {what} thread: {source}")]
    Spawn {
        what: &'static str,
        source: std::io::Error,
    },
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing loaded yet.
    Empty,
    /// Loaded and not running; `start` begins a run.
    Idle,
    /// A run is admitting or draining jobs.
    Running,
    /// A run finished without being stopped; `start` is a no-op until reload.
    Completed,
}

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub concurrency: usize,
    pub request: ImageRequest,
    pub throttle: Duration,
    /// Groups whose name contains this text are recorded as memberships.
    pub collection_match: String,
}

impl SessionOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            concurrency: settings.classification.effective_worker_count(),
            request: ImageRequest::square(
                settings.classification.target_size,
                ContentFit::AspectFill,
                DeliveryMode::Fast,
            ),
            throttle: Duration::from_millis(settings.publisher.throttle_ms),
            collection_match: settings.classification.collection_match.clone(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_settings(&AppSettings::default())
    }
}

struct Loaded {
    store: RecordStore,
    working: Arc<WorkingCopy>,
}

/// Loads records, runs classification in the background and publishes
/// throttled snapshots of the results.
///
/// Every method takes `&self`, so a session can be shared between a control
/// thread and observers.
pub struct ClassificationSession {
    source: Arc<dyn AssetSource>,
    classifier: Arc<dyn Classifier>,
    options: SessionOptions,
    publisher: SnapshotPublisher,
    loaded: Mutex<Option<Loaded>>,
    state: Arc<Mutex<SessionState>>,
    stop: Arc<AtomicBool>,
    run: Mutex<Option<JoinHandle<RunStats>>>,
}

impl ClassificationSession {
    pub fn new(
        source: Arc<dyn AssetSource>,
        classifier: Arc<dyn Classifier>,
        options: SessionOptions,
    ) -> Self {
        let publisher = SnapshotPublisher::new(options.throttle);
        Self {
            source,
            classifier,
            options,
            publisher,
            loaded: Mutex::new(None),
            state: Arc::new(Mutex::new(SessionState::Empty)),
            stop: Arc::new(AtomicBool::new(false)),
            run: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Observe throttled snapshots of the full record list.
    pub fn subscribe(&self) -> Receiver<Snapshot> {
        self.publisher.subscribe()
    }

    /// (Re)populate the records and their group memberships.
    ///
    /// Enumeration failures abort the load and keep the previous records.
    /// Returns the number of loaded records.
    pub fn load(&self) -> Result<usize, SessionError> {
        if self.state() == SessionState::Running {
            return Err(SessionError::Busy);
        }
        let mut store = RecordStore::from_assets(self.source.list_assets()?);
        self.match_collections(&mut store)?;
        let working = Arc::new(WorkingCopy::from_store(&store));
        let count = store.len();
        let initial = working.snapshot();
        {
            let mut state = lock(&self.state);
            if *state == SessionState::Running {
                return Err(SessionError::Busy);
            }
            *lock(&self.loaded) = Some(Loaded { store, working });
            *state = SessionState::Idle;
        }
        self.reap_finished_run();
        info!("Loaded {count} records");
        self.publisher.publish_now(initial);
        Ok(count)
    }

    fn match_collections(&self, store: &mut RecordStore) -> Result<(), SessionError> {
        let pattern = self.options.collection_match.as_str();
        if pattern.is_empty() {
            return Ok(());
        }
        for group in self.source.list_groups()? {
            if !group.contains(pattern) {
                continue;
            }
            match self.source.list_group_items(&group) {
                Ok(members) => {
                    let unknown = store.assign_group(&group, &members);
                    if unknown > 0 {
                        warn!("{unknown} members of {group} are not in the library");
                    }
                }
                Err(err) => warn!("Skipping collection {group}: {err}"),
            }
        }
        Ok(())
    }

    /// Begin classifying every record without a prediction.
    ///
    /// Returns `Ok(false)` without doing anything while a run is active or
    /// after a run completed.
    pub fn start(&self) -> Result<bool, SessionError> {
        let mut state = lock(&self.state);
        match *state {
            SessionState::Empty => return Err(SessionError::NotLoaded),
            SessionState::Running | SessionState::Completed => return Ok(false),
            SessionState::Idle => {}
        }
        let working = lock(&self.loaded)
            .as_ref()
            .map(|loaded| Arc::clone(&loaded.working))
            .ok_or(SessionError::NotLoaded)?;
        self.reap_finished_run();
        self.stop.store(false, Ordering::Relaxed);

        let (tx, rx) = mpsc::channel();
        let publisher_handle = self
            .publisher
            .spawn(working.snapshot(), rx)
            .map_err(|source| SessionError::Spawn {
                what: "publisher",
                source,
            })?;
        let source = Arc::clone(&self.source);
        let classifier = Arc::clone(&self.classifier);
        let stop = Arc::clone(&self.stop);
        let shared_state = Arc::clone(&self.state);
        let options = SchedulerOptions {
            concurrency: self.options.concurrency,
            request: self.options.request,
        };
        let handle = thread::Builder::new()
            .name("classify-scheduler".into())
            .spawn(move || {
                let stats = scheduler::run(
                    &working,
                    source.as_ref(),
                    classifier.as_ref(),
                    &stop,
                    tx,
                    options,
                );
                join_publisher(publisher_handle);
                *lock(&shared_state) = if stats.stopped {
                    SessionState::Idle
                } else {
                    SessionState::Completed
                };
                stats
            })
            .map_err(|source| SessionError::Spawn {
                what: "scheduler",
                source,
            })?;
        *lock(&self.run) = Some(handle);
        *state = SessionState::Running;
        Ok(true)
    }

    /// Stop admitting new jobs; jobs already running finish normally.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Block until the current run (if any) has finished and its final
    /// snapshot was published.
    pub fn wait(&self) -> Option<RunStats> {
        let handle = lock(&self.run).take()?;
        handle.join().ok()
    }

    /// The snapshot observers last received, if any was published.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.publisher.latest()
    }

    /// Value copy of the backing records, including results not yet published.
    pub fn records(&self) -> Vec<Record> {
        lock(&self.loaded)
            .as_ref()
            .map(|loaded| loaded.working.snapshot())
            .unwrap_or_default()
    }

    /// Group names recorded for the record at `index` during `load`.
    pub fn collections_at(&self, index: usize) -> Vec<String> {
        lock(&self.loaded)
            .as_ref()
            .and_then(|loaded| {
                let record = loaded.store.get(index)?;
                Some(loaded.store.groups_for(&record.asset).map(str::to_string).collect())
            })
            .unwrap_or_default()
    }

    fn reap_finished_run(&self) {
        let mut run = lock(&self.run);
        if run.as_ref().is_some_and(JoinHandle::is_finished)
            && let Some(handle) = run.take()
        {
            let _ = handle.join();
        }
    }
}

impl Drop for ClassificationSession {
    fn drop(&mut self) {
        self.stop();
        let _ = self.wait();
    }
}

/// Join the publisher thread, returning its emission count.
pub(super) fn join_publisher(handle: JoinHandle<usize>) -> Option<usize> {
    match handle.join() {
        Ok(emissions) => Some(emissions),
        Err(payload) => {
            warn!(
                "Snapshot publisher panicked; final snapshot lost: {}",
                panic_to_string(payload)
            );
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
