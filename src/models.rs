use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{base64::Base64, serde_as};
use std::collections::HashMap;
use std::path::PathBuf;

/// Rectangular region of interest at base resolution.
///
/// Signed fields so that malformed requests (negative or zero sizes) can be
/// represented and rejected with a useful message instead of failing to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Roi {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl std::fmt::Display for Roi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x={}, y={}, w={}, h={}", self.x, self.y, self.width, self.height)
    }
}

/// One RGB color value; serializes as `[r, g, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorSample(pub [u8; 3]);

impl ColorSample {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    /// Feature vector with each channel scaled from 0..=255 to `[-1, 1]`.
    pub fn features(&self) -> [f64; 3] {
        self.0.map(|v| v as f64 / 127.5 - 1.0)
    }
}

impl From<image::Rgb<u8>> for ColorSample {
    fn from(px: image::Rgb<u8>) -> Self {
        Self(px.0)
    }
}

/// Output of the pipeline for a single ROI.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiResult {
    /// Final mask, PNG-encoded.
    #[serde_as(as = "Base64")]
    pub mask_png: Vec<u8>,

    /// Colors of every pixel where the final mask is nonzero, row-major.
    pub rgb_samples: Vec<ColorSample>,
}

/// Parameters for running the segmentation pipeline over a set of ROIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    #[serde(alias = "wsi_path")]
    pub image_path: PathBuf,
    pub rois: Vec<Roi>,
    pub threshold_type: String,
    /// Cutoff for the manual threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_value: Option<f64>,
    #[serde(default)]
    pub morph_ops: Vec<String>,
    /// Per-operator kwargs, keyed by operator name
    #[serde(default)]
    pub morph_kwargs: HashMap<String, Value>,
}

impl ProcessRequest {
    /// The explicit field, else a numeric `manual_value` entry in `morph_kwargs`.
    pub fn manual_value(&self) -> Option<f64> {
        self.manual_value
            .or_else(|| self.morph_kwargs.get("manual_value").and_then(Value::as_f64))
    }
}

/// Outcome of a training call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOutcome {
    pub model_id: String,
    pub loss_history: Vec<f64>,
}
