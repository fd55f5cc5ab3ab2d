//! Fixed-length color features extracted from an image.

use image::DynamicImage;
use image::imageops::FilterType;

/// Bins per color channel.
pub const HISTOGRAM_BINS: usize = 8;
/// Per-channel histograms followed by per-channel means.
pub const FEATURE_DIM: usize = HISTOGRAM_BINS * 3 + 3;
/// Identifier stored in models so features and weights stay compatible.
pub const FEATURE_KIND: &str = "rgb_histogram_v1";

/// Images are downsampled to this edge length before counting.
const SAMPLE_EDGE: u32 = 64;

/// Normalized RGB histograms and channel means of `image`.
///
/// Each channel's histogram sums to 1; means are in `[0, 1]`. An empty image
/// yields all zeros.
pub fn image_features(image: &DynamicImage) -> Vec<f32> {
    let mut features = vec![0.0f32; FEATURE_DIM];
    if image.width() == 0 || image.height() == 0 {
        return features;
    }
    let sample = image
        .resize_exact(SAMPLE_EDGE, SAMPLE_EDGE, FilterType::Triangle)
        .to_rgb8();
    let count = (sample.width() * sample.height()) as f32;
    let means_at = HISTOGRAM_BINS * 3;
    for pixel in sample.pixels() {
        for channel in 0..3 {
            let value = pixel[channel] as usize;
            let bin = value * HISTOGRAM_BINS / 256;
            features[channel * HISTOGRAM_BINS + bin] += 1.0;
            features[means_at + channel] += value as f32 / 255.0;
        }
    }
    for value in &mut features {
        *value /= count;
    }
    features
}
