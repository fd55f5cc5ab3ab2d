use super::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"").unwrap();
}

fn paths(count: usize) -> Vec<PathBuf> {
    (0..count).map(|i| PathBuf::from(format!("{i}.png"))).collect()
}

const CAPS: SplitCaps = SplitCaps {
    training: 1000,
    evaluation: 200,
};

#[test]
fn split_sizes_follow_caps() {
    let mut rng = StdRng::seed_from_u64(7);
    for (count, training, evaluation) in [(0, 0, 0), (5, 5, 0), (1000, 1000, 0), (1100, 1000, 100), (5000, 1000, 200)] {
        let split = split_label_files("Cocoa", paths(count), CAPS, &mut rng);
        assert_eq!(split.training.len(), training, "count {count}");
        assert_eq!(split.evaluation.len(), evaluation, "count {count}");
    }
}

#[test]
fn split_slices_are_disjoint_and_cover_small_labels() {
    let mut rng = StdRng::seed_from_u64(1);
    let split = split_label_files("Cocoa", paths(1200), CAPS, &mut rng);
    let training: HashSet<_> = split.training.iter().collect();
    let evaluation: HashSet<_> = split.evaluation.iter().collect();
    assert!(training.is_disjoint(&evaluation));
    assert_eq!(training.len() + evaluation.len(), 1200);
}

#[test]
fn dataset_from_disk_respects_layout() {
    let dir = tempdir().unwrap();
    for i in 0..1200 {
        touch(&dir.path().join(format!("Cocoa/{i:04}.png")));
    }
    touch(&dir.path().join("Cocoa/notes.txt"));
    touch(&dir.path().join("Cocoa/.hidden.png"));
    touch(&dir.path().join("Cocoa/nested/deep.png"));
    touch(&dir.path().join("Other/a.jpg"));
    touch(&dir.path().join(".cache/x.png"));
    fs::create_dir_all(dir.path().join("Empty")).unwrap();

    let data = prepare_dataset(dir.path(), CAPS, &mut rand::rng()).unwrap();
    assert_eq!(data.labels(), vec!["Cocoa", "Empty", "Other"]);
    let cocoa = &data.splits[0];
    assert_eq!(cocoa.training.len(), 1000);
    assert_eq!(cocoa.evaluation.len(), 200);
    assert!(cocoa
        .training
        .iter()
        .chain(&cocoa.evaluation)
        .all(|path| path.extension().is_some_and(|ext| ext == "png")
            && path.parent() == Some(dir.path().join("Cocoa").as_path())));
    assert!(data.splits[1].training.is_empty());
    assert_eq!(data.splits[2].training.len(), 1);
}

#[test]
fn unreadable_root_is_fatal() {
    let dir = tempdir().unwrap();
    let err = list_labels(&dir.path().join("missing")).unwrap_err();
    assert!(matches!(err, TrainingError::ReadDir { .. }));
}

/// Procedure that waits for a go signal, then replays a scripted session.
struct ScriptedProcedure {
    go: Mutex<Option<Receiver<()>>>,
    seen: Mutex<Option<TrainingData>>,
}

impl ScriptedProcedure {
    fn new() -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let procedure = Self {
            go: Mutex::new(Some(rx)),
            seen: Mutex::new(None),
        };
        (procedure, tx)
    }
}

impl TrainingProcedure for ScriptedProcedure {
    type Checkpoint = usize;
    type Model = String;

    fn train(
        &self,
        data: TrainingData,
        params: &HyperParameters,
    ) -> Result<TrainingJob<usize, String>, TrainingError> {
        *self.seen.lock().unwrap() = Some(data);
        let go = self.go.lock().unwrap().take().unwrap();
        let (progress_tx, progress) = mpsc::channel();
        let (checkpoint_tx, checkpoints) = mpsc::channel();
        let (result_tx, result) = mpsc::channel();
        let params = *params;
        thread::spawn(move || {
            let _ = go.recv();
            for iteration in 1..=params.iterations {
                if iteration % params.report_interval == 0 {
                    let _ = progress_tx.send(iteration as f64 / params.iterations as f64);
                }
                if iteration % params.checkpoint_interval == 0 {
                    let _ = checkpoint_tx.send(iteration);
                }
            }
            let _ = result_tx.send(Ok("model".to_string()));
        });
        Ok(TrainingJob {
            progress,
            checkpoints,
            result,
        })
    }
}

#[test]
fn orchestrator_relays_all_three_channels() {
    let dir = tempdir().unwrap();
    for i in 0..3 {
        touch(&dir.path().join(format!("Cocoa/{i}.png")));
        touch(&dir.path().join(format!("Not Cocoa/{i}.png")));
    }
    let (procedure, go) = ScriptedProcedure::new();
    let params = HyperParameters {
        max_iterations: 25,
        iterations: 20,
        report_interval: 5,
        checkpoint_interval: 10,
    };
    let orchestrator = TrainingOrchestrator::new(procedure, CAPS, params);
    let run = orchestrator.train(dir.path()).unwrap();
    let progress = run.subscribe_progress();
    let checkpoints = run.subscribe_checkpoints();
    let result = run.subscribe_result();
    go.send(()).unwrap();

    assert_eq!(progress.iter().collect::<Vec<_>>(), vec![0.25, 0.5, 0.75, 1.0]);
    assert_eq!(checkpoints.iter().collect::<Vec<_>>(), vec![10, 20]);
    assert_eq!(
        result.recv_timeout(Duration::from_secs(5)).unwrap().unwrap(),
        "model"
    );

    // Late subscribers still see the terminal result.
    let late = run.subscribe_result();
    assert_eq!(late.recv().unwrap().unwrap(), "model");
    assert_eq!(run.wait().unwrap(), "model");

    let seen = orchestrator.procedure.seen.lock().unwrap().clone().unwrap();
    assert_eq!(seen.labels(), vec!["Cocoa", "Not Cocoa"]);
    assert_eq!(seen.training_len(), 6);
}

#[test]
fn empty_dataset_is_rejected_before_training() {
    let dir = tempdir().unwrap();
    let (procedure, _go) = ScriptedProcedure::new();
    let orchestrator = TrainingOrchestrator::new(procedure, CAPS, HyperParameters::default());
    assert!(matches!(
        orchestrator.train(dir.path()),
        Err(TrainingError::NoLabels(_))
    ));
    assert!(orchestrator.procedure.seen.lock().unwrap().is_none());
}

/// Procedure that publishes its whole session as soon as it is started.
struct EagerProcedure;

impl TrainingProcedure for EagerProcedure {
    type Checkpoint = usize;
    type Model = usize;

    fn train(
        &self,
        _data: TrainingData,
        params: &HyperParameters,
    ) -> Result<TrainingJob<usize, usize>, TrainingError> {
        let (progress_tx, progress) = mpsc::channel();
        let (checkpoint_tx, checkpoints) = mpsc::channel();
        let (result_tx, result) = mpsc::channel();
        let total = params.effective_iterations();
        thread::spawn(move || {
            for iteration in 1..=total {
                let _ = progress_tx.send(iteration as f64 / total as f64);
                let _ = checkpoint_tx.send(iteration);
            }
            let _ = result_tx.send(Ok(total));
        });
        Ok(TrainingJob {
            progress,
            checkpoints,
            result,
        })
    }
}

#[test]
fn events_published_before_subscription_still_arrive() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("Cocoa/0.png"));
    let params = HyperParameters {
        max_iterations: 10,
        iterations: 1000,
        report_interval: 1,
        checkpoint_interval: 1,
    };
    let orchestrator = TrainingOrchestrator::new(EagerProcedure, CAPS, params);
    let run = orchestrator.train(dir.path()).unwrap();
    // Let the procedure finish before anyone subscribes.
    thread::sleep(Duration::from_millis(100));
    let progress = run.subscribe_progress();
    let checkpoints = run.subscribe_checkpoints();
    assert_eq!(run.wait().unwrap(), 10);

    assert_eq!(progress.iter().count(), 10);
    assert_eq!(checkpoints.iter().collect::<Vec<_>>(), (1..=10).collect::<Vec<_>>());
}
