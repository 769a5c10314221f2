use crate::error::Result;
use crate::pipeline::{MetadataValue, PipelineContext, PipelineData, PipelineStep};
use crate::segmentation::morphology::MorphologyPipeline;
use crate::segmentation::threshold::{apply_threshold, threshold_luminance, ThresholdMethod};
use image::DynamicImage;

/// Convert each region to a binary mask
pub struct ThresholdStep {
    pub method: ThresholdMethod,
}

impl PipelineStep for ThresholdStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::with_capacity(data.len());
        for item in data {
            let (mask, level) = match item.image.as_luma8() {
                Some(gray) => threshold_luminance(gray, &self.method),
                None => apply_threshold(&item.original, &self.method),
            };
            tracing::debug!("ROI ({}): {} threshold, level={:?}", item.roi, self.method.name(), level);

            let mut new_item = item.with_image(DynamicImage::ImageLuma8(mask));
            if let Some(level) = level {
                new_item = new_item.with_metadata("threshold_level", MetadataValue::Float(level));
            }
            result.push(new_item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Threshold"
    }
}

/// Refine each mask with the operator sequence
pub struct MorphologyStep {
    pub ops: MorphologyPipeline,
}

impl PipelineStep for MorphologyStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::with_capacity(data.len());
        for item in data {
            let refined = self.ops.apply(&item.image.to_luma8());
            let foreground = refined.pixels().filter(|p| p[0] > 0).count();

            let new_item = item
                .with_image(DynamicImage::ImageLuma8(refined))
                .with_metadata("foreground_pixels", MetadataValue::Int(foreground as i64));
            result.push(new_item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Morphology"
    }
}
