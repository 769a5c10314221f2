use image::{ImageBuffer, Rgb, RgbImage};
use serde_json::Value;
use std::collections::HashMap;
use tempfile::NamedTempFile;
use wsiseg::{ColorSample, Orchestrator, ProcessRequest, Roi};

pub const GRAY: Rgb<u8> = Rgb([128, 128, 128]);

/// Saves `img` as a PNG slide. The file is removed when dropped.
pub fn save_slide(img: &RgbImage) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp slide file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test slide");
    file
}

/// A solid-color slide of the given size.
pub fn create_solid_slide(width: u32, height: u32, color: Rgb<u8>) -> NamedTempFile {
    save_slide(&ImageBuffer::from_pixel(width, height, color))
}

fn square_image() -> RgbImage {
    ImageBuffer::from_fn(64, 64, |x, y| {
        if (24..40).contains(&x) && (24..40).contains(&y) {
            Rgb([230u8, 220u8, 210u8])
        } else {
            Rgb([20u8, 30u8, 40u8])
        }
    })
}

/// 64x64 dark background with a bright 16x16 square at (24, 24).
pub fn create_square_slide() -> NamedTempFile {
    save_slide(&square_image())
}

/// The square slide stored as a TIFF.
pub fn create_square_tiff_slide() -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".tif")
        .tempfile()
        .expect("Failed to create temp slide file");
    square_image()
        .save_with_format(file.path(), image::ImageFormat::Tiff)
        .expect("Failed to save test slide");
    file
}

/// Request with no morphology and a manual cutoff.
pub fn manual_request(slide: &NamedTempFile, rois: Vec<Roi>, cutoff: f64) -> ProcessRequest {
    ProcessRequest {
        image_path: slide.path().to_path_buf(),
        rois,
        threshold_type: "manual".to_string(),
        manual_value: Some(cutoff),
        morph_ops: Vec::new(),
        morph_kwargs: HashMap::new(),
    }
}

pub fn with_ops(mut request: ProcessRequest, ops: &[&str], kwargs: Value) -> ProcessRequest {
    request.morph_ops = ops.iter().map(|s| s.to_string()).collect();
    request.morph_kwargs = serde_json::from_value(kwargs).expect("kwargs must be an object");
    request
}

pub fn decode_mask(png: &[u8]) -> image::GrayImage {
    image::load_from_memory(png).expect("mask is a valid PNG").to_luma8()
}

/// `n` copies of one color
pub fn repeat(color: [u8; 3], n: usize) -> Vec<ColorSample> {
    vec![ColorSample(color); n]
}

/// Orchestrator over image-crate slides with the default unknown-op policy
pub fn orchestrator() -> Orchestrator {
    Orchestrator::default()
}
