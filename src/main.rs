#![deny(missing_docs)]

//! Classifies every image of a folder library and writes the predictions.
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use cocoasort::classify::{ClassificationSession, SessionOptions};
use cocoasort::config::{self, AppSettings};
use cocoasort::library::FolderLibrary;
use cocoasort::logging;
use cocoasort::ml::LogRegClassifier;
use cocoasort::records::Record;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    let settings = load_settings(&options)?;

    let model_path = match &options.model_path {
        Some(path) => path.clone(),
        None => settings
            .classification
            .resolved_model_path()
            .map_err(|err| err.to_string())?,
    };
    let classifier =
        LogRegClassifier::load(&model_path, &settings.classification.positive_label)
            .map_err(|err| err.to_string())?;
    let library = FolderLibrary::open(&options.library).map_err(|err| err.to_string())?;

    let session_options = SessionOptions::from_settings(&settings);
    println!(
        "Classifying {} with {} workers",
        options.library.display(),
        session_options.concurrency
    );
    let session =
        ClassificationSession::new(Arc::new(library), Arc::new(classifier), session_options);
    let updates = session.subscribe();
    let reporter = thread::spawn(move || {
        for snapshot in updates {
            println!(
                "{}/{} classified ({} failed)",
                snapshot.classified(),
                snapshot.total(),
                snapshot.failed()
            );
        }
    });

    let total = session.load().map_err(|err| err.to_string())?;
    if total > 0 {
        session.start().map_err(|err| err.to_string())?;
        if let Some(stats) = session.wait() {
            println!(
                "Done: {} classified, {} failed",
                stats.classified, stats.failed
            );
        }
    }
    let records: Vec<Record> = session
        .records()
        .into_iter()
        .filter(Record::is_classified)
        .collect();
    drop(session);
    let _ = reporter.join();

    write_results(&options.out, &records)?;
    println!("Wrote {} results to {}", records.len(), options.out.display());
    Ok(())
}

fn load_settings(options: &CliOptions) -> Result<AppSettings, String> {
    let mut settings = match &options.config_path {
        Some(path) => config::load_from_path(path),
        None => config::load_or_default(),
    }
    .map_err(|err| err.to_string())?;
    if let Some(workers) = options.workers {
        settings.classification.worker_count = workers;
    }
    Ok(settings.normalized())
}

fn write_results(path: &Path, records: &[Record]) -> Result<(), String> {
    let file = File::create(path)
        .map_err(|err| format!("Failed to create {}: {err}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), records)
        .map_err(|err| format!("Failed to write {}: {err}", path.display()))
}

#[derive(Debug, Clone)]
struct CliOptions {
    library: PathBuf,
    out: PathBuf,
    workers: Option<u32>,
    model_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut library: Option<PathBuf> = None;
    let mut out = PathBuf::from("results.json");
    let mut workers = None;
    let mut model_path = None;
    let mut config_path = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--out" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--out requires a value".to_string())?;
                out = PathBuf::from(value);
            }
            "--workers" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--workers requires a value".to_string())?;
                let parsed = value
                    .parse::<u32>()
                    .map_err(|_| format!("Invalid --workers value: {value}"))?;
                workers = Some(parsed);
            }
            "--model" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--model requires a value".to_string())?;
                model_path = Some(PathBuf::from(value));
            }
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            unknown if unknown.starts_with('-') => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
            positional => {
                if library.is_some() {
                    return Err(format!("Unexpected argument: {positional}\n\n{}", help_text()));
                }
                library = Some(PathBuf::from(positional));
            }
        }
        idx += 1;
    }

    let library = library.ok_or_else(help_text)?;
    Ok(CliOptions {
        library,
        out,
        workers,
        model_path,
        config_path,
    })
}

fn help_text() -> String {
    [
        "cocoasort",
        "",
        "Scores every image of a library folder with a trained model and writes the results as JSON.",
        "",
        "Usage:",
        "  cocoasort <library> [--out results.json] [--workers N] [--model model.json] [--config config.toml]",
    ]
    .join("\n")
}
