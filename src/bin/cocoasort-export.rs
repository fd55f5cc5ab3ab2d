//! Exports the enabled groups of a folder library as TIFF images.

use std::path::PathBuf;
use std::sync::Arc;

use cocoasort::config;
use cocoasort::export::{ExportEvent, ExportOptions, Exporter};
use cocoasort::library::FolderLibrary;
use cocoasort::logging;

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
    let destination = options
        .destination
        .or_else(|| settings.export.destination_root.clone())
        .ok_or_else(help_text)?;
    let library = FolderLibrary::open(&options.library).map_err(|err| err.to_string())?;
    let exporter = Exporter::new(Arc::new(library), ExportOptions::from_settings(&settings));
    let export = exporter
        .export(&destination)
        .map_err(|err| err.to_string())?;

    let mut failure = None;
    for event in export.events() {
        match event {
            ExportEvent::Item(item) => println!(
                "[{:>5.1}%] {} -> {}",
                export.progress().fraction() * 100.0,
                item.asset,
                item.path.display()
            ),
            ExportEvent::Completed(summary) => println!(
                "Exported {} items from {} groups to {}",
                summary.written,
                summary.groups,
                destination.display()
            ),
            ExportEvent::Failed(err) => failure = Some(err.to_string()),
        }
    }
    let summary = export.wait().map_err(|err| err.to_string())?;
    match failure {
        Some(err) => Err(format!(
            "Export failed: {err} ({} written, {} failed)",
            summary.written, summary.failed
        )),
        None => Ok(()),
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    library: PathBuf,
    destination: Option<PathBuf>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Err(help_text()),
            unknown if unknown.starts_with('-') => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    let mut positional = positional.into_iter();
    let library = positional.next().ok_or_else(help_text)?;
    let destination = positional.next();
    if positional.next().is_some() {
        return Err(help_text());
    }
    Ok(CliOptions {
        library,
        destination,
    })
}

fn help_text() -> String {
    [
        "cocoasort-export",
        "",
        "Writes every item of the groups listed in [export].groups as <destination>/<group>/<item>.tiff.",
        "",
        "Usage:",
        "  cocoasort-export <library> [<destination>]",
        "",
        "The destination defaults to [export].destination_root from config.toml.",
    ]
    .join("\n")
}
