mod support;

use std::sync::Arc;
use std::time::Duration;

use cocoasort::classify::{ClassificationSession, SessionOptions, SessionState};
use cocoasort::library::{ContentFit, DeliveryMode, FolderLibrary, ImageRequest};
use cocoasort::records::Record;
use support::fakes::SleepyClassifier;
use support::images::{write_corrupt, write_png};

fn options(concurrency: usize) -> SessionOptions {
    SessionOptions {
        concurrency,
        request: ImageRequest::square(32, ContentFit::AspectFill, DeliveryMode::Fast),
        throttle: Duration::from_millis(20),
        collection_match: "Cocoa".to_string(),
    }
}

#[test]
fn five_items_two_workers_publish_intermediate_and_final_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    for i in 0..3 {
        write_png(&temp.path().join(format!("Cocoa/{i}.png")), [200, 100, 50]);
    }
    for i in 0..2 {
        write_png(&temp.path().join(format!("Beach/{i}.png")), [20, 100, 200]);
    }
    let library = FolderLibrary::open(temp.path()).expect("open library");
    let classifier = Arc::new(SleepyClassifier::new(Duration::from_millis(40)));
    let session = ClassificationSession::new(Arc::new(library), classifier.clone(), options(2));
    let updates = session.subscribe();

    assert_eq!(session.load().expect("load"), 5);
    assert!(session.start().expect("start"));
    let stats = session.wait().expect("run finished");
    assert_eq!(stats.classified, 5);
    assert!(classifier.peak() <= 2);
    assert_eq!(session.state(), SessionState::Completed);

    let snapshots: Vec<_> = updates.try_iter().collect();
    let last = snapshots.last().expect("final snapshot");
    assert_eq!(last.classified(), 5);
    assert!(
        snapshots
            .iter()
            .any(|snapshot| snapshot.classified() > 0 && snapshot.classified() < 5),
        "expected an intermediate snapshot"
    );
    for record in last.records.iter() {
        let in_cocoa = record.asset.as_str().starts_with("Cocoa/");
        assert_eq!(record.collections.is_empty(), !in_cocoa, "{}", record.asset);
        let score = record.prediction.expect("classified");
        assert!((0.0..=1.0).contains(&score));
        if in_cocoa {
            assert!(score > 0.7);
        }
    }

    assert!(!session.start().expect("restart is a no-op"));
    assert_eq!(classifier.calls(), 5);
}

#[test]
fn unreadable_images_are_tagged_and_do_not_stop_the_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_png(&temp.path().join("a.png"), [10, 10, 10]);
    write_corrupt(&temp.path().join("b.png"));
    write_png(&temp.path().join("c.png"), [250, 10, 10]);
    let library = FolderLibrary::open(temp.path()).expect("open library");
    let session = ClassificationSession::new(
        Arc::new(library),
        Arc::new(SleepyClassifier::new(Duration::ZERO)),
        options(4),
    );
    session.load().expect("load");
    session.start().expect("start");
    let stats = session.wait().expect("run finished");
    assert_eq!((stats.classified, stats.failed), (2, 1));

    let records = session.records();
    assert!(records[1].failure.is_some());
    assert!(records[1].prediction.is_none());

    let classified: Vec<&Record> = records.iter().filter(|r| r.is_classified()).collect();
    let json = serde_json::to_value(&classified).expect("serialize");
    assert_eq!(json[0]["asset_id"], "a.png");
    assert!(json[1]["prediction"].as_f64().expect("score") > 0.9);
    assert!(json[0].get("failure").is_none());
}

#[test]
fn reload_resets_predictions() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_png(&temp.path().join("a.png"), [128, 0, 0]);
    let library = FolderLibrary::open(temp.path()).expect("open library");
    let classifier = Arc::new(SleepyClassifier::new(Duration::ZERO));
    let session = ClassificationSession::new(Arc::new(library), classifier.clone(), options(1));
    session.load().expect("load");
    session.start().expect("start");
    session.wait();
    assert_eq!(session.state(), SessionState::Completed);

    session.load().expect("reload");
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.records()[0].prediction.is_none());
    assert!(session.start().expect("start after reload"));
    session.wait();
    assert_eq!(classifier.calls(), 2);
}
