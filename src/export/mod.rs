//! Exports the members of selected groups as image files, one directory per
//! group, with nested progress and a single combined event stream.

use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::ImageFormat;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::Semaphore;
use crate::config::AppSettings;
use crate::library::{AssetError, AssetRef, AssetSource, ContentFit, DeliveryMode, ImageRequest};
use crate::logging::panic_to_string;
use crate::progress::ProgressNode;

/// File extension of exported images.
pub const EXPORT_EXTENSION: &str = "tiff";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to create export directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Library error: {0}")]
    Library(#[from] AssetError),
    #[error("Group {0} is enabled for export but not present in the library")]
    MissingGroup(String),
    #[error("Failed to fetch {asset}: {source}")]
    Fetch { asset: AssetRef, source: AssetError },
    #[error("Failed to write {path}: {source}")]
    Save {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Failed to spawn export worker: {0}")]
    Spawn(std::io::Error),
    #[error("Export worker panicked: {0}")]
    Panicked(String),
}

/// Tunables for an export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Group names to export; other groups are ignored.
    pub groups: Vec<String>,
    pub request: ImageRequest,
    /// Maximum items written at once across all groups.
    pub concurrency: usize,
}

impl ExportOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            groups: settings.export.groups.clone(),
            request: ImageRequest::square(
                settings.export.image_size,
                ContentFit::AspectFit,
                DeliveryMode::Exact,
            ),
            concurrency: settings.classification.effective_worker_count(),
        }
    }
}

/// One item written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedItem {
    pub group: String,
    pub asset: AssetRef,
    pub path: PathBuf,
}

/// Totals of a finished export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub groups: usize,
    pub written: usize,
    pub failed: usize,
}

/// Event on the combined export stream.
///
/// A run ends with exactly one `Completed` or `Failed`; nothing follows it.
#[derive(Debug)]
pub enum ExportEvent {
    Item(ExportedItem),
    Completed(ExportSummary),
    Failed(ExportError),
}

/// Handle to a running export.
pub struct ExportRun {
    events: Receiver<ExportEvent>,
    progress: ProgressNode,
    handle: JoinHandle<ExportSummary>,
}

impl ExportRun {
    pub fn events(&self) -> &Receiver<ExportEvent> {
        &self.events
    }

    /// Root of the progress tree; one weighted child per group.
    pub fn progress(&self) -> &ProgressNode {
        &self.progress
    }

    /// Block until every group worker finished, including items still in
    /// flight after a failure was reported.
    pub fn wait(self) -> Result<ExportSummary, ExportError> {
        self.handle
            .join()
            .map_err(|payload| ExportError::Panicked(panic_to_string(payload)))
    }
}

struct GroupJob {
    name: String,
    items: Vec<AssetRef>,
    destination: PathBuf,
    progress: ProgressNode,
}

/// Writes enabled groups of an [`AssetSource`] below a destination root.
pub struct Exporter {
    source: Arc<dyn AssetSource>,
    options: ExportOptions,
}

impl Exporter {
    pub fn new(source: Arc<dyn AssetSource>, options: ExportOptions) -> Self {
        Self { source, options }
    }

    /// Validate the configuration, create the destination directories and
    /// start one worker per enabled group.
    ///
    /// Errors returned here happen before any item is scheduled.
    pub fn export(&self, root: &Path) -> Result<ExportRun, ExportError> {
        create_dir(root)?;
        let plans = self.plan(root)?;
        let progress = ProgressNode::new(plans.len() as u64);
        let jobs: Vec<GroupJob> = plans
            .into_iter()
            .map(|(name, items, destination)| GroupJob {
                progress: progress.child(1, items.len() as u64),
                name,
                items,
                destination,
            })
            .collect();
        info!(
            "Exporting {} groups to {}",
            jobs.len(),
            root.display()
        );

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let (item_tx, item_rx) = mpsc::channel();
        let group_count = jobs.len();
        let (workers, gates) = spawn_gated(jobs, |job, gate| {
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            let request = self.options.request;
            let tx = item_tx.clone();
            thread::Builder::new()
                .name(format!("export-{}", job.name))
                .spawn(move || {
                    if gate.recv().is_ok() {
                        export_group(job, source.as_ref(), &semaphore, request, tx);
                    }
                })
        })?;
        drop(item_tx);

        let (event_tx, events) = mpsc::channel();
        let (handoff_tx, handoff) = mpsc::channel();
        let handle = match thread::Builder::new()
            .name("export-events".into())
            .spawn(move || forward_events(item_rx, event_tx, handoff, group_count))
        {
            Ok(handle) => handle,
            Err(err) => {
                drop(gates);
                join_all(workers);
                return Err(ExportError::Spawn(err));
            }
        };
        let _ = handoff_tx.send(workers);
        for gate in gates {
            let _ = gate.send(());
        }
        Ok(ExportRun {
            events,
            progress,
            handle,
        })
    }

    fn plan(&self, root: &Path) -> Result<Vec<(String, Vec<AssetRef>, PathBuf)>, ExportError> {
        let available = self.source.list_groups()?;
        let mut plans = Vec::new();
        for group in &self.options.groups {
            if !available.contains(group) {
                return Err(ExportError::MissingGroup(group.clone()));
            }
            let items = self.source.list_group_items(group)?;
            let destination = root.join(group);
            create_dir(&destination)?;
            plans.push((group.clone(), items, destination));
        }
        Ok(plans)
    }
}

fn export_group(
    job: GroupJob,
    source: &dyn AssetSource,
    semaphore: &Semaphore,
    request: ImageRequest,
    results: Sender<Result<ExportedItem, ExportError>>,
) {
    debug!("Exporting {} items of {}", job.items.len(), job.name);
    thread::scope(|scope| {
        for asset in &job.items {
            let permit = semaphore.acquire();
            let job = &job;
            let tx = results.clone();
            let spawned = thread::Builder::new().spawn_scoped(scope, move || {
                let _permit = permit;
                let result = catch_unwind(AssertUnwindSafe(|| {
                    export_item(source, asset, request, &job.destination)
                }))
                .unwrap_or_else(|payload| Err(ExportError::Panicked(panic_to_string(payload))));
                let result = result.map(|path| {
                    job.progress.increment(1);
                    ExportedItem {
                        group: job.name.clone(),
                        asset: asset.clone(),
                        path,
                    }
                });
                let _ = tx.send(result);
            });
            if let Err(err) = spawned {
                let _ = results.send(Err(ExportError::Spawn(err)));
            }
        }
    });
}

fn export_item(
    source: &dyn AssetSource,
    asset: &AssetRef,
    request: ImageRequest,
    destination: &Path,
) -> Result<PathBuf, ExportError> {
    let image = source
        .fetch_image(asset, request)
        .map_err(|source| ExportError::Fetch {
            asset: asset.clone(),
            source,
        })?;
    let path = destination.join(format!(
        "{}.{EXPORT_EXTENSION}",
        sanitize_file_name(asset.as_str())
    ));
    image
        .save_with_format(&path, ImageFormat::Tiff)
        .map_err(|source| ExportError::Save {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// Spawn one thread per job; each waits for its gate before doing any work.
///
/// If any spawn fails, the gates are dropped so the threads already started
/// return without working, and they are joined before the error is returned.
fn spawn_gated<T>(
    jobs: Vec<T>,
    mut spawn: impl FnMut(T, Receiver<()>) -> std::io::Result<JoinHandle<()>>,
) -> Result<(Vec<JoinHandle<()>>, Vec<Sender<()>>), ExportError> {
    let mut workers = Vec::with_capacity(jobs.len());
    let mut gates = Vec::with_capacity(jobs.len());
    for job in jobs {
        let (gate_tx, gate_rx) = mpsc::channel();
        match spawn(job, gate_rx) {
            Ok(handle) => {
                workers.push(handle);
                gates.push(gate_tx);
            }
            Err(err) => {
                drop(gates);
                join_all(workers);
                return Err(ExportError::Spawn(err));
            }
        }
    }
    Ok((workers, gates))
}

fn join_all(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        let _ = worker.join();
    }
}

/// Merge item results into the public stream and emit the terminal event.
fn forward_events(
    items: Receiver<Result<ExportedItem, ExportError>>,
    events: Sender<ExportEvent>,
    workers: Receiver<Vec<JoinHandle<()>>>,
    groups: usize,
) -> ExportSummary {
    let mut summary = ExportSummary {
        groups,
        ..ExportSummary::default()
    };
    let mut failed = false;
    // Ends once every group worker dropped its sender.
    for result in items {
        match result {
            Ok(item) => {
                summary.written += 1;
                if !failed {
                    let _ = events.send(ExportEvent::Item(item));
                }
            }
            Err(err) => {
                summary.failed += 1;
                warn!("Export item failed: {err}");
                if !failed {
                    failed = true;
                    let _ = events.send(ExportEvent::Failed(err));
                }
            }
        }
    }
    for worker in workers.recv().unwrap_or_default() {
        if let Err(payload) = worker.join() {
            let message = panic_to_string(payload);
            warn!("Export group worker panicked: {message}");
            summary.failed += 1;
            if !failed {
                failed = true;
                let _ = events.send(ExportEvent::Failed(ExportError::Panicked(message)));
            }
        }
    }
    info!(
        "Export finished: written={} failed={}",
        summary.written, summary.failed
    );
    if !failed {
        let _ = events.send(ExportEvent::Completed(summary.clone()));
    }
    summary
}

/// Replace characters that are not allowed in file names.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

fn create_dir(path: &Path) -> Result<(), ExportError> {
    fs::create_dir_all(path).map_err(|source| ExportError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}
