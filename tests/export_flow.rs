mod support;

use std::sync::Arc;
use std::time::Duration;

use cocoasort::config::AppSettings;
use cocoasort::export::{ExportError, ExportEvent, ExportOptions, Exporter};
use cocoasort::library::FolderLibrary;
use support::images::{write_corrupt, write_png};

fn drain(events: &std::sync::mpsc::Receiver<ExportEvent>) -> Vec<ExportEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.recv_timeout(Duration::from_secs(10)) {
        out.push(event);
    }
    out
}

#[test]
fn export_fails_fast_but_writes_healthy_siblings() {
    let temp = tempfile::tempdir().expect("tempdir");
    let library_root = temp.path().join("library");
    write_png(&library_root.join("Cocoa/1.png"), [200, 120, 60]);
    write_corrupt(&library_root.join("Cocoa/2.png"));
    write_png(&library_root.join("Cocoa/3.png"), [190, 110, 50]);
    write_png(&library_root.join("Holidays/4.png"), [0, 0, 255]);
    let library = FolderLibrary::open(&library_root).expect("open library");

    let destination = temp.path().join("export");
    let exporter = Exporter::new(
        Arc::new(library),
        ExportOptions::from_settings(&AppSettings::default()),
    );
    let run = exporter.export(&destination).expect("start export");
    let events = drain(run.events());
    let summary = run.wait().expect("join export");

    let failures = events
        .iter()
        .filter(|event| matches!(event, ExportEvent::Failed(_)))
        .count();
    assert_eq!(failures, 1);
    assert!(!events.iter().any(|event| matches!(event, ExportEvent::Completed(_))));
    assert!(matches!(
        events.last(),
        Some(ExportEvent::Failed(ExportError::Fetch { .. }))
    ));
    assert_eq!((summary.written, summary.failed), (2, 1));

    let written = destination.join("Cocoa");
    assert!(written.join("Cocoa_1.png.tiff").is_file());
    assert!(written.join("Cocoa_3.png.tiff").is_file());
    assert!(!written.join("Cocoa_2.png.tiff").exists());
    assert!(!destination.join("Holidays").exists());

    let exported = image::open(written.join("Cocoa_1.png.tiff")).expect("decode tiff");
    assert_eq!(exported.width().max(exported.height()), 160);
}

#[test]
fn export_of_missing_group_is_a_configuration_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_png(&temp.path().join("library/Holidays/1.png"), [1, 2, 3]);
    let library = FolderLibrary::open(temp.path().join("library")).expect("open library");
    let result = Exporter::new(
        Arc::new(library),
        ExportOptions::from_settings(&AppSettings::default()),
    )
    .export(&temp.path().join("export"));
    assert!(matches!(result, Err(ExportError::MissingGroup(_))));
}
