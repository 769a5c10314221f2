use super::{SlideHandle, SlideSource};
use crate::error::{AnalysisError, Result};
use image::{DynamicImage, ImageReader, RgbImage};
use std::path::{Path, PathBuf};

/// Slide source for formats the `image` crate can decode (TIFF, PNG, JPEG, ...).
///
/// The whole base layer is decoded on open. Tiled TIFF slides go through
/// [`TiffSlideSource`](super::TiffSlideSource) instead when opened via
/// [`SlideFileSource`](super::SlideFileSource).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSlideSource;

/// An open slide decoded into memory.
pub struct ImageSlide {
    path: PathBuf,
    image: DynamicImage,
}

impl SlideSource for ImageSlideSource {
    type Handle = ImageSlide;

    fn open(&self, path: &Path) -> Result<ImageSlide> {
        if !path.exists() {
            return Err(AnalysisError::not_found(format!(
                "WSI file not found: {}",
                path.display()
            )));
        }

        let image = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| {
                AnalysisError::not_found(format!("Failed to open slide {}: {}", path.display(), e))
            })?
            .decode()
            .map_err(|e| {
                AnalysisError::not_found(format!(
                    "{} is not a readable slide: {}",
                    path.display(),
                    e
                ))
            })?;

        tracing::debug!(
            "Opened slide {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );

        Ok(ImageSlide {
            path: path.to_path_buf(),
            image,
        })
    }
}

impl SlideHandle for ImageSlide {
    fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    fn read_region(&mut self, x: i64, y: i64, width: u32, height: u32) -> Result<RgbImage> {
        let (slide_w, slide_h) = self.dimensions();
        let mut region = RgbImage::new(width, height);

        // Intersection of the requested window with the slide
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(width as i64).min(slide_w as i64);
        let y1 = y.saturating_add(height as i64).min(slide_h as i64);

        if x1 > x0 && y1 > y0 {
            // to_rgb8 drops any alpha channel
            let visible = self
                .image
                .crop_imm(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
                .to_rgb8();
            image::imageops::replace(&mut region, &visible, x0 - x, y0 - y);
        }

        Ok(region)
    }
}

impl Drop for ImageSlide {
    fn drop(&mut self) {
        tracing::debug!("Closed slide {}", self.path.display());
    }
}
