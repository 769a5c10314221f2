use super::{SlideHandle, SlideSource};
use crate::error::{AnalysisError, Result};
use image::{Rgb, RgbImage};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

/// Slide source for tiled or stripped TIFF files, SVS included.
///
/// Only the base layer is used. A read decodes just the tiles (or strips)
/// that intersect the requested window.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffSlideSource;

/// An open TIFF slide; pixel data stays on disk until a region is read.
pub struct TiffSlide {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    dimensions: (u32, u32),
    samples: usize,
}

impl SlideSource for TiffSlideSource {
    type Handle = TiffSlide;

    fn open(&self, path: &Path) -> Result<TiffSlide> {
        if !path.exists() {
            return Err(AnalysisError::not_found(format!(
                "WSI file not found: {}",
                path.display()
            )));
        }
        let unreadable =
            |e: tiff::TiffError| AnalysisError::not_found(format!("{} is not a readable slide: {}", path.display(), e));

        let file = File::open(path)
            .map_err(|e| AnalysisError::not_found(format!("Failed to open slide {}: {}", path.display(), e)))?;
        let mut decoder = Decoder::new(BufReader::new(file)).map_err(unreadable)?;
        let dimensions = decoder.dimensions().map_err(unreadable)?;
        let color = decoder.colortype().map_err(unreadable)?;
        let samples = samples_per_pixel(color).ok_or_else(|| {
            AnalysisError::not_found(format!(
                "{} is not a readable slide: unsupported color type {:?}",
                path.display(),
                color
            ))
        })?;

        let (chunk_w, chunk_h) = decoder.chunk_dimensions();
        tracing::debug!(
            "Opened TIFF slide {} ({}x{}, {:?}, {}x{} chunks)",
            path.display(),
            dimensions.0,
            dimensions.1,
            color,
            chunk_w,
            chunk_h
        );

        Ok(TiffSlide {
            path: path.to_path_buf(),
            decoder,
            dimensions,
            samples,
        })
    }
}

/// 8-bit layouts whose first samples are gray or red, green, blue.
fn samples_per_pixel(color: ColorType) -> Option<usize> {
    match color {
        ColorType::Gray(8) => Some(1),
        ColorType::GrayA(8) => Some(2),
        ColorType::RGB(8) => Some(3),
        ColorType::RGBA(8) => Some(4),
        _ => None,
    }
}

impl SlideHandle for TiffSlide {
    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn read_region(&mut self, x: i64, y: i64, width: u32, height: u32) -> Result<RgbImage> {
        let (slide_w, slide_h) = self.dimensions;
        let mut region = RgbImage::new(width, height);

        // Intersection of the requested window with the slide
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(width as i64).min(slide_w as i64);
        let y1 = y.saturating_add(height as i64).min(slide_h as i64);
        if x1 <= x0 || y1 <= y0 {
            return Ok(region);
        }
        let (x0, y0, x1, y1) = (x0 as u32, y0 as u32, x1 as u32, y1 as u32);

        // Strips are chunks as wide as the slide
        let (chunk_w, chunk_h) = self.decoder.chunk_dimensions();
        let chunks_across = slide_w.div_ceil(chunk_w);

        let mut decoded = 0;
        for row in y0 / chunk_h..=(y1 - 1) / chunk_h {
            for col in x0 / chunk_w..=(x1 - 1) / chunk_w {
                let index = row * chunks_across + col;
                let (data_w, data_h) = self.decoder.chunk_data_dimensions(index);
                let data = match self.decoder.read_chunk(index) {
                    Ok(DecodingResult::U8(data)) => data,
                    Ok(_) => return Err(AnalysisError::processing("TIFF chunk is not 8-bit")),
                    Err(e) => {
                        return Err(AnalysisError::processing(format!(
                            "failed to decode chunk {} of {}: {}",
                            index,
                            self.path.display(),
                            e
                        )));
                    }
                };
                decoded += 1;

                let origin_x = col * chunk_w;
                let origin_y = row * chunk_h;
                for sy in y0.max(origin_y)..y1.min(origin_y + data_h) {
                    for sx in x0.max(origin_x)..x1.min(origin_x + data_w) {
                        let offset = ((sy - origin_y) as usize * data_w as usize + (sx - origin_x) as usize) * self.samples;
                        let px = data
                            .get(offset..offset + self.samples)
                            .ok_or_else(|| AnalysisError::processing(format!("TIFF chunk {} is truncated", index)))?;
                        // Alpha, when present, is dropped
                        let rgb = if self.samples < 3 {
                            Rgb([px[0], px[0], px[0]])
                        } else {
                            Rgb([px[0], px[1], px[2]])
                        };
                        region.put_pixel((sx as i64 - x) as u32, (sy as i64 - y) as u32, rgb);
                    }
                }
            }
        }

        tracing::debug!("Decoded {} chunk(s) for a {}x{} region", decoded, width, height);
        Ok(region)
    }
}

impl Drop for TiffSlide {
    fn drop(&mut self) {
        tracing::debug!("Closed slide {}", self.path.display());
    }
}
