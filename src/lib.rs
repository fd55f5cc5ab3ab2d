//! Library exports for the binaries, benchmarks and tests.
/// Application directory helpers.
pub mod app_dirs;
/// Bounded-concurrency classification and snapshot publishing.
pub mod classify;
/// Persistent settings.
pub mod config;
/// Group export with nested progress.
pub mod export;
/// Asset source abstraction and the folder-backed library.
pub mod library;
/// Logging setup.
pub mod logging;
/// Reference classifier and trainer.
pub mod ml;
/// Weighted progress trees.
pub mod progress;
/// Work items and their stores.
pub mod records;
/// Dataset splitting and training orchestration.
pub mod training;
