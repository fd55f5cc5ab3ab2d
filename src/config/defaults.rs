pub(super) const MAX_WORKER_COUNT: u32 = 64;
pub(super) const WORKERS_ENV: &str = "COCOASORT_WORKERS";

pub(super) fn clamp_worker_count(value: u32) -> u32 {
    value.min(MAX_WORKER_COUNT)
}

pub(super) fn clamp_throttle_ms(value: u64) -> u64 {
    value.clamp(10, 5_000)
}

pub(super) fn default_target_size() -> u32 {
    1080
}

pub(super) fn default_positive_label() -> String {
    "Cocoa".to_string()
}

pub(super) fn default_throttle_ms() -> u64 {
    100
}

pub(super) fn default_export_groups() -> Vec<String> {
    vec![default_positive_label()]
}

pub(super) fn default_export_image_size() -> u32 {
    160
}

pub(super) fn default_training_cap() -> usize {
    1000
}

pub(super) fn default_evaluation_cap() -> usize {
    200
}

pub(super) fn default_max_iterations() -> usize {
    25
}

pub(super) fn default_iterations() -> usize {
    1000
}

pub(super) fn default_report_interval() -> usize {
    5
}

pub(super) fn default_checkpoint_interval() -> usize {
    10
}
