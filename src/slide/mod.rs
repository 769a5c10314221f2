mod image_reader;
mod tiff_reader;

pub use image_reader::{ImageSlide, ImageSlideSource};
pub use tiff_reader::{TiffSlide, TiffSlideSource};

use crate::error::{AnalysisError, Result};
use crate::models::Roi;
use image::RgbImage;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Largest ROI, in pixels, that a single request may read (8192 x 8192).
pub const MAX_ROI_PIXELS: u64 = 8192 * 8192;

/// An open slide. Dropping the handle closes it.
pub trait SlideHandle {
    /// Base-layer dimensions (width, height).
    fn dimensions(&self) -> (u32, u32);

    /// Read a `width` x `height` RGB window whose top-left corner is at
    /// (`x`, `y`) in base-layer coordinates. Pixels outside the slide are black.
    fn read_region(&mut self, x: i64, y: i64, width: u32, height: u32) -> Result<RgbImage>;
}

/// Something that can open pyramidal slides by path.
pub trait SlideSource: Send + Sync {
    type Handle: SlideHandle;

    fn open(&self, path: &Path) -> Result<Self::Handle>;
}

/// Read the ROI at base resolution.
///
/// The handle lives only for the duration of this call and is released on
/// every exit path, including a failed read.
pub fn extract_region<S>(source: &S, path: &Path, roi: &Roi) -> Result<RgbImage>
where
    S: SlideSource + ?Sized,
{
    let (width, height) = roi_size(roi)?;
    let _span = tracing::debug_span!("extract_region", path = %path.display(), %roi).entered();

    let mut handle = source.open(path)?;
    let region = handle.read_region(roi.x, roi.y, width, height)?;

    if region.dimensions() != (width, height) {
        return Err(AnalysisError::processing(format!(
            "slide reader returned {}x{} for ROI ({})",
            region.width(),
            region.height(),
            roi
        )));
    }

    Ok(region)
}

/// Reader picked per file: TIFF containers (including SVS) are decoded one
/// tile or strip at a time, everything else is decoded whole.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlideFileSource;

pub enum SlideFile {
    Tiff(TiffSlide),
    Decoded(ImageSlide),
}

impl SlideHandle for SlideFile {
    fn dimensions(&self) -> (u32, u32) {
        match self {
            SlideFile::Tiff(slide) => slide.dimensions(),
            SlideFile::Decoded(slide) => slide.dimensions(),
        }
    }

    fn read_region(&mut self, x: i64, y: i64, width: u32, height: u32) -> Result<RgbImage> {
        match self {
            SlideFile::Tiff(slide) => slide.read_region(x, y, width, height),
            SlideFile::Decoded(slide) => slide.read_region(x, y, width, height),
        }
    }
}

impl SlideSource for SlideFileSource {
    type Handle = SlideFile;

    fn open(&self, path: &Path) -> Result<SlideFile> {
        if is_tiff(path)? {
            TiffSlideSource.open(path).map(SlideFile::Tiff)
        } else {
            ImageSlideSource.open(path).map(SlideFile::Decoded)
        }
    }
}

/// Classic and BigTIFF magic in either byte order.
fn is_tiff(path: &Path) -> Result<bool> {
    let mut file = File::open(path)
        .map_err(|e| AnalysisError::not_found(format!("WSI file not found: {}: {}", path.display(), e)))?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() {
        return Ok(false);
    }
    Ok(matches!(&magic, b"II*\0" | b"MM\0*" | b"II+\0" | b"MM\0+"))
}

/// Width and height of a valid ROI that fits the per-request pixel limit.
pub fn roi_size(roi: &Roi) -> Result<(u32, u32)> {
    if !roi.is_valid() {
        return Err(AnalysisError::invalid(format!(
            "Invalid ROI size: width and height must be > 0 (got w={}, h={})",
            roi.width, roi.height
        )));
    }
    let width = u32::try_from(roi.width)
        .map_err(|_| AnalysisError::invalid(format!("ROI width too large: {}", roi.width)))?;
    let height = u32::try_from(roi.height)
        .map_err(|_| AnalysisError::invalid(format!("ROI height too large: {}", roi.height)))?;
    let pixels = u64::from(width).checked_mul(u64::from(height)).unwrap_or(u64::MAX);
    if pixels > MAX_ROI_PIXELS {
        return Err(AnalysisError::invalid(format!(
            "ROI too large: {}x{} is {} pixels, at most {} are allowed",
            width, height, pixels, MAX_ROI_PIXELS
        )));
    }
    Ok((width, height))
}
