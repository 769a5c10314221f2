use super::preprocessing;
use crate::error::{AnalysisError, Result};
use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Neighborhood size used by the adaptive threshold.
pub const ADAPTIVE_BLOCK_SIZE: u32 = 35;

const LOCAL_EPSILON: f64 = 1e-9;

/// Thresholding policy as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdType {
    Otsu,
    Adaptive,
    Manual,
}

impl FromStr for ThresholdType {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "otsu" => Ok(Self::Otsu),
            "adaptive" => Ok(Self::Adaptive),
            "manual" => Ok(Self::Manual),
            other => Err(AnalysisError::invalid(format!("Invalid threshold type: '{}'", other))),
        }
    }
}

/// A fully specified threshold, ready to apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdMethod {
    /// Global cutoff minimizing intra-class variance
    Otsu,
    /// Per-pixel cutoff from a Gaussian-weighted local mean
    Adaptive { block_size: u32 },
    /// Caller-supplied cutoff; pixels strictly above it are foreground
    Manual(f64),
}

impl ThresholdMethod {
    pub fn resolve(kind: ThresholdType, manual_value: Option<f64>) -> Result<Self> {
        match kind {
            ThresholdType::Otsu => Ok(Self::Otsu),
            ThresholdType::Adaptive => Ok(Self::Adaptive { block_size: ADAPTIVE_BLOCK_SIZE }),
            ThresholdType::Manual => match manual_value {
                Some(v) if v.is_finite() => Ok(Self::Manual(v)),
                Some(v) => Err(AnalysisError::invalid(format!("manual threshold value must be finite, got {}", v))),
                None => Err(AnalysisError::invalid("manual threshold requires a manual_value")),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Otsu => "otsu",
            Self::Adaptive { .. } => "adaptive",
            Self::Manual(_) => "manual",
        }
    }
}

/// Binary mask (0/255) of the pixels brighter than the chosen threshold.
///
/// Also returns the global cutoff that was used, if there was one.
pub fn apply_threshold(region: &RgbImage, method: &ThresholdMethod) -> (GrayImage, Option<f64>) {
    threshold_luminance(&preprocessing::to_grayscale(region), method)
}

/// [`apply_threshold`] for a region that is already single-channel luminance.
pub fn threshold_luminance(gray: &GrayImage, method: &ThresholdMethod) -> (GrayImage, Option<f64>) {
    match *method {
        ThresholdMethod::Otsu => {
            let level = otsu_cutoff(gray);
            (binarize(gray, |v| v > level), Some(level as f64))
        }
        ThresholdMethod::Adaptive { block_size } => {
            let local = local_threshold(gray, block_size);
            let width = gray.width() as usize;
            let mask = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
                let mean = local[y as usize * width + x as usize];
                // Absorb float round-off so flat areas compare equal to their own mean
                let fg = gray.get_pixel(x, y)[0] as f64 - mean > LOCAL_EPSILON;
                Luma([if fg { 255 } else { 0 }])
            });
            (mask, None)
        }
        ThresholdMethod::Manual(cutoff) => (binarize(gray, |v| v as f64 > cutoff), Some(cutoff)),
    }
}

/// Otsu's level, except that a uniform region is its own level (all background).
fn otsu_cutoff(gray: &GrayImage) -> u8 {
    let mut values = gray.pixels().map(|p| p[0]);
    match values.next() {
        Some(first) if values.all(|v| v == first) => first,
        _ => imageproc::contrast::otsu_level(gray),
    }
}

/// Gaussian-weighted local mean over a `block_size` neighborhood, row-major.
///
/// sigma = (block_size - 1) / 6, kernel truncated at 4 sigma, borders mirrored.
fn local_threshold(gray: &GrayImage, block_size: u32) -> Vec<f64> {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let src: Vec<f64> = gray.as_raw().iter().map(|&v| v as f64).collect();

    let sigma = block_size.saturating_sub(1) as f64 / 6.0;
    if sigma <= 0.0 {
        return src;
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as i64;

    let mut rows = vec![0.0; w * h];
    for y in 0..h {
        for x in 0..w {
            rows[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, wt)| wt * src[y * w + reflect(x as i64 + k as i64 - radius, w)])
                .sum();
        }
    }

    let mut out = vec![0.0; w * h];
    for y in 0..h {
        for x in 0..w {
            out[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, wt)| wt * rows[reflect(y as i64 + k as i64 - radius, h) * w + x])
                .sum();
        }
    }
    out
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5) as i64;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|i| (-0.5 * (i * i) as f64 / (sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|v| v / total).collect()
}

/// Mirror an out-of-range index back into `0..len` (edge sample repeated)
fn reflect(idx: i64, len: usize) -> usize {
    let len = len as i64;
    if len == 1 {
        return 0;
    }
    let period = 2 * len;
    let mut i = idx.rem_euclid(period);
    if i >= len {
        i = period - 1 - i;
    }
    i as usize
}

fn binarize(gray: &GrayImage, foreground: impl Fn(u8) -> bool) -> GrayImage {
    let mut mask = gray.clone();
    for p in mask.pixels_mut() {
        p[0] = if foreground(p[0]) { 255 } else { 0 };
    }
    mask
}
