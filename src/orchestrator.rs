use crate::error::{AnalysisError, Result};
use crate::models::{ColorSample, ProcessRequest, Roi, RoiResult};
use crate::pipeline::PipelineData;
use crate::segmentation::build_segmentation_pipeline;
use crate::segmentation::morphology::{MorphologyPipeline, UnknownOpPolicy};
use crate::segmentation::threshold::{ThresholdMethod, ThresholdType};
use crate::slide::{extract_region, roi_size, SlideFileSource, SlideSource};
use image::{GrayImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Runs extraction, thresholding and morphology for every ROI of a request.
pub struct Orchestrator<S: SlideSource = SlideFileSource> {
    source: S,
    unknown_op_policy: UnknownOpPolicy,
    debug_dir: Option<PathBuf>,
    requests_seen: AtomicU64,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(SlideFileSource, UnknownOpPolicy::default())
    }
}

impl<S: SlideSource> Orchestrator<S> {
    pub fn new(source: S, unknown_op_policy: UnknownOpPolicy) -> Self {
        Self {
            source,
            unknown_op_policy,
            debug_dir: None,
            requests_seen: AtomicU64::new(0),
        }
    }

    /// Save each request's intermediate masks under `dir/request_NNNN/`.
    pub fn with_debug_dir(mut self, dir: PathBuf) -> Self {
        self.debug_dir = Some(dir);
        self
    }

    /// One result per ROI, in request order. Fails as a whole if any ROI fails.
    pub fn process_rois(&self, request: &ProcessRequest) -> Result<Vec<RoiResult>> {
        let request_no = self.requests_seen.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            "Received ROI request: path={}, rois={}, threshold_type={}, morph_ops={:?}",
            request.image_path.display(),
            request.rois.len(),
            request.threshold_type,
            request.morph_ops
        );

        // Validate everything before touching the slide
        let (method, ops) = self.validate(request).inspect_err(|e| tracing::error!("{}", e))?;

        let mut data = Vec::with_capacity(request.rois.len());
        for (idx, roi) in request.rois.iter().enumerate() {
            tracing::info!("Extracting ROI {}: {}", idx, roi);
            let region = extract_region(&self.source, &request.image_path, roi)
                .map_err(|e| roi_failure(idx, roi, e))?;
            data.push(PipelineData::from_region(region, *roi));
        }

        let mut pipeline = build_segmentation_pipeline(method, ops);
        if let Some(dir) = &self.debug_dir {
            pipeline = pipeline.with_debug(dir.join(format!("request_{:04}", request_no)))?;
        }
        let processed = pipeline.run(data).map_err(|e| {
            tracing::error!("Processing error: {}", e);
            e
        })?;

        let mut results = Vec::with_capacity(processed.len());
        for (idx, item) in processed.into_iter().enumerate() {
            let mask = item.image.to_luma8();
            if mask.dimensions() != item.original.dimensions() {
                return Err(roi_failure(
                    idx,
                    &item.roi,
                    AnalysisError::processing(format!(
                        "mask is {}x{} but region is {}x{}",
                        mask.width(),
                        mask.height(),
                        item.original.width(),
                        item.original.height()
                    )),
                ));
            }

            let rgb_samples = collect_samples(&item.original, &mask);
            tracing::debug!("ROI {}: {} foreground pixels", idx, rgb_samples.len());
            results.push(RoiResult {
                mask_png: encode_png(&mask).map_err(|e| roi_failure(idx, &item.roi, e))?,
                rgb_samples,
            });
        }

        Ok(results)
    }

    fn validate(&self, request: &ProcessRequest) -> Result<(ThresholdMethod, MorphologyPipeline)> {
        if !request.image_path.exists() {
            return Err(AnalysisError::not_found(format!(
                "WSI file not found: {}",
                request.image_path.display()
            )));
        }
        if request.rois.is_empty() {
            return Err(AnalysisError::invalid("No ROIs provided. Please select at least one ROI."));
        }
        for (idx, roi) in request.rois.iter().enumerate() {
            roi_size(roi).map_err(|e| match e {
                AnalysisError::InvalidArgument(msg) => AnalysisError::invalid(format!("ROI {}: {}", idx, msg)),
                other => other,
            })?;
        }

        let kind: ThresholdType = request.threshold_type.parse()?;
        let method = ThresholdMethod::resolve(kind, request.manual_value())?;
        let ops = MorphologyPipeline::build(&request.morph_ops, &request.morph_kwargs, self.unknown_op_policy)?;
        Ok((method, ops))
    }
}

/// Colors of the pixels where the mask is nonzero, row-major
pub fn collect_samples(region: &RgbImage, mask: &GrayImage) -> Vec<ColorSample> {
    region
        .pixels()
        .zip(mask.pixels())
        .filter(|(_, m)| m[0] > 0)
        .map(|(px, _)| ColorSample::from(*px))
        .collect()
}

/// Lossless encoding of a mask for display
pub fn encode_png(mask: &GrayImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    mask.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Attach ROI context to unexpected failures; classified errors pass through.
fn roi_failure(idx: usize, roi: &Roi, err: AnalysisError) -> AnalysisError {
    match err {
        AnalysisError::ProcessingFailure(msg) => {
            tracing::error!("Processing error in ROI {} ({}): {}", idx, roi, msg);
            AnalysisError::processing(format!("ROI {} ({}): {}", idx, roi, msg))
        }
        other => {
            tracing::error!("ROI {} ({}): {}", idx, roi, other);
            other
        }
    }
}
