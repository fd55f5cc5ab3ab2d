use std::path::Path;

use image::{Rgb, RgbImage};

pub fn write_png(path: &Path, rgb: [u8; 3]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create image parent dirs");
    }
    RgbImage::from_pixel(12, 8, Rgb(rgb))
        .save(path)
        .expect("write png");
}

pub fn write_corrupt(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create image parent dirs");
    }
    std::fs::write(path, b"definitely not a png").expect("write corrupt file");
}
