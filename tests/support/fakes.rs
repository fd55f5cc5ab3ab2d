use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use cocoasort::classify::{Classifier, ClassifyError};
use image::DynamicImage;

/// Classifier that sleeps, then scores by the mean red value of the image.
pub struct SleepyClassifier {
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub running: AtomicUsize,
    pub peak: AtomicUsize,
}

impl SleepyClassifier {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Classifier for SleepyClassifier {
    fn classify(&self, image: &DynamicImage) -> Result<f64, ClassifyError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        let rgb = image.to_rgb8();
        let red = rgb.pixels().map(|p| f64::from(p[0])).sum::<f64>()
            / (rgb.width() * rgb.height()).max(1) as f64;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(red / 255.0)
    }
}
