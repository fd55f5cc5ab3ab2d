//! Trains the reference classifier on a label-per-folder dataset.

use std::path::PathBuf;
use std::thread;

use cocoasort::config;
use cocoasort::logging;
use cocoasort::ml::LogRegTrainer;
use cocoasort::training::TrainingOrchestrator;

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
    let settings = config::load_or_default().map_err(|err| err.to_string())?;
    let orchestrator =
        TrainingOrchestrator::from_settings(LogRegTrainer::default(), &settings.training);
    let training = orchestrator
        .train(&options.dataset)
        .map_err(|err| err.to_string())?;

    let progress = training.subscribe_progress();
    let checkpoints = training.subscribe_checkpoints();
    let progress_printer = thread::spawn(move || {
        for fraction in progress {
            println!("Training {:>5.1}%", fraction * 100.0);
        }
    });
    let checkpoint_printer = thread::spawn(move || {
        for checkpoint in checkpoints {
            match checkpoint.validation_accuracy {
                Some(validation) => println!(
                    "Checkpoint {}: train accuracy {:.3}, validation accuracy {:.3}",
                    checkpoint.iteration, checkpoint.training_accuracy, validation
                ),
                None => println!(
                    "Checkpoint {}: train accuracy {:.3}",
                    checkpoint.iteration, checkpoint.training_accuracy
                ),
            }
        }
    });

    let model = training.wait().map_err(|err| err.to_string())?;
    let _ = progress_printer.join();
    let _ = checkpoint_printer.join();
    model
        .save(&options.model_out)
        .map_err(|err| err.to_string())?;
    println!(
        "Saved model with classes {:?} to {}",
        model.classes,
        options.model_out.display()
    );
    Ok(())
}

#[derive(Debug, Clone)]
struct CliOptions {
    dataset: PathBuf,
    model_out: PathBuf,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        return Err(help_text());
    }
    match args.as_slice() {
        [dataset, model_out] if !dataset.starts_with('-') && !model_out.starts_with('-') => {
            Ok(CliOptions {
                dataset: PathBuf::from(dataset),
                model_out: PathBuf::from(model_out),
            })
        }
        _ => Err(help_text()),
    }
}

fn help_text() -> String {
    [
        "cocoasort-train",
        "",
        "Trains a logistic regression model on a dataset with one folder per label.",
        "Use the folder names as labels, e.g. `Cocoa` and `Not Cocoa`.",
        "",
        "Usage:",
        "  cocoasort-train <dataset> <model.json>",
    ]
    .join("\n")
}
