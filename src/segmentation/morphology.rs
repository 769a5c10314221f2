use super::preprocessing::normalize_mask;
use crate::error::{AnalysisError, Result};
use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, dilate, erode, open};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The fixed set of binary morphological operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MorphOp {
    Erosion,
    Dilation,
    Opening,
    Closing,
}

impl MorphOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "erosion" => Some(Self::Erosion),
            "dilation" => Some(Self::Dilation),
            "opening" => Some(Self::Opening),
            "closing" => Some(Self::Closing),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Erosion => "erosion",
            Self::Dilation => "dilation",
            Self::Opening => "opening",
            Self::Closing => "closing",
        }
    }
}

/// What to do with operator names outside the fixed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UnknownOpPolicy {
    /// Pass the mask through unchanged
    #[default]
    SkipUnknown,
    /// Fail the request with InvalidArgument
    RejectUnknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FootprintShape {
    /// |dx| + |dy| <= r
    Diamond,
    /// max(|dx|, |dy|) <= r
    Square,
    /// dx² + dy² <= r²
    Disk,
}

impl FootprintShape {
    fn norm(&self) -> Norm {
        match self {
            Self::Diamond => Norm::L1,
            Self::Square => Norm::LInf,
            Self::Disk => Norm::L2,
        }
    }
}

/// Structuring element, parsed from an operator's kwargs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuringElement {
    pub shape: FootprintShape,
    pub radius: u8,
}

impl Default for StructuringElement {
    /// 3x3 cross
    fn default() -> Self {
        Self {
            shape: FootprintShape::Diamond,
            radius: 1,
        }
    }
}

impl StructuringElement {
    /// Parse `{"radius": n, "shape": "diamond" | "square" | "disk"}`; both keys optional.
    pub fn from_kwargs(op: &str, kwargs: &Value) -> Result<Self> {
        let Value::Object(map) = kwargs else {
            return Err(AnalysisError::invalid(format!(
                "kwargs for '{}' must be an object, got {}",
                op, kwargs
            )));
        };

        let mut element = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "radius" => {
                    element.radius = value
                        .as_u64()
                        .and_then(|r| u8::try_from(r).ok())
                        .ok_or_else(|| {
                            AnalysisError::invalid(format!(
                                "'{}' radius must be an integer in 0..=255, got {}",
                                op, value
                            ))
                        })?;
                }
                "shape" => {
                    element.shape = serde_json::from_value(value.clone()).map_err(|_| {
                        AnalysisError::invalid(format!(
                            "'{}' shape must be one of diamond, square, disk; got {}",
                            op, value
                        ))
                    })?;
                }
                other => {
                    return Err(AnalysisError::invalid(format!(
                        "unexpected keyword '{}' for '{}'",
                        other, op
                    )));
                }
            }
        }
        Ok(element)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphStep {
    pub op: MorphOp,
    pub element: StructuringElement,
}

/// An ordered list of operators, each feeding the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MorphologyPipeline {
    steps: Vec<MorphStep>,
}

impl MorphologyPipeline {
    pub fn new(steps: Vec<MorphStep>) -> Self {
        Self { steps }
    }

    /// Resolve operator names and their kwargs (looked up by name, default empty).
    pub fn build(ops: &[String], kwargs: &HashMap<String, Value>, policy: UnknownOpPolicy) -> Result<Self> {
        let mut steps = Vec::with_capacity(ops.len());

        for name in ops {
            let Some(op) = MorphOp::from_name(name) else {
                match policy {
                    UnknownOpPolicy::SkipUnknown => {
                        tracing::debug!("Skipping unknown morphology operator '{}'", name);
                        continue;
                    }
                    UnknownOpPolicy::RejectUnknown => {
                        return Err(AnalysisError::invalid(format!(
                            "unknown morphology operator '{}'",
                            name
                        )));
                    }
                }
            };

            let element = match kwargs.get(name) {
                Some(op_kwargs) => StructuringElement::from_kwargs(name, op_kwargs)?,
                None => StructuringElement::default(),
            };
            steps.push(MorphStep { op, element });
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[MorphStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Apply every step in order; the result is renormalized to 0/255.
    pub fn apply(&self, mask: &GrayImage) -> GrayImage {
        let mut result = mask.clone();
        for step in &self.steps {
            let norm = step.element.shape.norm();
            let k = step.element.radius;
            result = match step.op {
                MorphOp::Erosion => erode(&result, norm, k),
                MorphOp::Dilation => dilate(&result, norm, k),
                MorphOp::Opening => open(&result, norm, k),
                MorphOp::Closing => close(&result, norm, k),
            };
        }
        normalize_mask(&mut result);
        result
    }
}

/// Build and apply in one call.
pub fn apply_morphology(
    mask: &GrayImage,
    ops: &[String],
    kwargs: &HashMap<String, Value>,
    policy: UnknownOpPolicy,
) -> Result<GrayImage> {
    Ok(MorphologyPipeline::build(ops, kwargs, policy)?.apply(mask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use serde_json::json;

    fn ops(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn count_fg(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p[0] > 0).count()
    }

    fn single_dot() -> GrayImage {
        let mut mask = GrayImage::new(9, 9);
        mask.put_pixel(4, 4, Luma([255]));
        mask
    }

    fn square_block() -> GrayImage {
        GrayImage::from_fn(9, 9, |x, y| {
            let inside = (3..=5).contains(&x) && (3..=5).contains(&y);
            Luma([if inside { 255 } else { 0 }])
        })
    }

    #[test]
    fn test_default_dilation_is_cross() {
        let out = apply_morphology(&single_dot(), &ops(&["dilation"]), &HashMap::new(), UnknownOpPolicy::SkipUnknown).unwrap();
        assert_eq!(count_fg(&out), 5);
        assert_eq!(out.get_pixel(4, 3)[0], 255);
        assert_eq!(out.get_pixel(3, 3)[0], 0);
    }

    #[test]
    fn test_square_footprint_kwargs() {
        let mut kwargs = HashMap::new();
        kwargs.insert("dilation".to_string(), json!({"radius": 2, "shape": "square"}));
        let out = apply_morphology(&single_dot(), &ops(&["dilation"]), &kwargs, UnknownOpPolicy::SkipUnknown).unwrap();
        assert_eq!(count_fg(&out), 25);
    }

    #[test]
    fn test_erosion_shrinks_block() {
        let out = apply_morphology(&square_block(), &ops(&["erosion"]), &HashMap::new(), UnknownOpPolicy::SkipUnknown).unwrap();
        assert_eq!(count_fg(&out), 1);
        assert_eq!(out.get_pixel(4, 4)[0], 255);
    }

    #[test]
    fn test_opening_removes_speck_and_closing_fills_hole() {
        let opened = apply_morphology(&single_dot(), &ops(&["opening"]), &HashMap::new(), UnknownOpPolicy::SkipUnknown).unwrap();
        assert_eq!(count_fg(&opened), 0);

        let mut holed = GrayImage::from_pixel(9, 9, Luma([255]));
        holed.put_pixel(4, 4, Luma([0]));
        let closed = apply_morphology(&holed, &ops(&["closing"]), &HashMap::new(), UnknownOpPolicy::SkipUnknown).unwrap();
        assert_eq!(closed.get_pixel(4, 4)[0], 255);
    }

    #[test]
    fn test_unknown_op_skipped() {
        let kwargs = HashMap::new();
        let with_unknown = apply_morphology(&square_block(), &ops(&["dilation", "unknown_op", "erosion"]), &kwargs, UnknownOpPolicy::SkipUnknown).unwrap();
        let without = apply_morphology(&square_block(), &ops(&["dilation", "erosion"]), &kwargs, UnknownOpPolicy::SkipUnknown).unwrap();
        assert_eq!(with_unknown.as_raw(), without.as_raw());
    }

    #[test]
    fn test_unknown_op_rejected() {
        let result = MorphologyPipeline::build(&ops(&["dilation", "unknown_op"]), &HashMap::new(), UnknownOpPolicy::RejectUnknown);
        match result {
            Err(AnalysisError::InvalidArgument(msg)) => assert!(msg.contains("unknown_op")),
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn test_composition_matches_sequential_calls() {
        let mask = GrayImage::from_fn(16, 16, |x, y| Luma([if (x * 3 + y * 5) % 7 < 3 { 255 } else { 0 }]));
        let kwargs = HashMap::new();
        let policy = UnknownOpPolicy::SkipUnknown;

        let combined = apply_morphology(&mask, &ops(&["dilation", "erosion"]), &kwargs, policy).unwrap();
        let first = apply_morphology(&mask, &ops(&["dilation"]), &kwargs, policy).unwrap();
        let second = apply_morphology(&first, &ops(&["erosion"]), &kwargs, policy).unwrap();
        assert_eq!(combined.as_raw(), second.as_raw());
    }

    #[test]
    fn test_empty_ops_only_renormalize() {
        let mask = GrayImage::from_fn(3, 1, |x, _| Luma([x as u8 * 10]));
        let out = apply_morphology(&mask, &[], &HashMap::new(), UnknownOpPolicy::SkipUnknown).unwrap();
        assert_eq!(out.as_raw(), &vec![0, 255, 255]);
    }

    #[test]
    fn test_bad_kwargs_rejected() {
        for bad in [json!({"radius": 300}), json!({"shape": "hexagon"}), json!({"footprint": 3}), json!(5)] {
            let result = StructuringElement::from_kwargs("erosion", &bad);
            assert!(matches!(result, Err(AnalysisError::InvalidArgument(_))), "accepted {}", bad);
        }
    }

    #[test]
    fn test_kwargs_for_other_ops_ignored() {
        let mut kwargs = HashMap::new();
        kwargs.insert("manual_value".to_string(), json!(100));
        let pipeline = MorphologyPipeline::build(&ops(&["erosion"]), &kwargs, UnknownOpPolicy::SkipUnknown).unwrap();
        assert_eq!(pipeline.steps()[0].element, StructuringElement::default());
    }
}
