use crate::error::{AnalysisError, Result};
use crate::models::Roi;
use crate::segmentation::preprocessing::to_grayscale;
use image::{DynamicImage, RgbImage};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Data that flows through the pipeline
/// Each PipelineData represents a single ROI with associated metadata
#[derive(Clone)]
pub struct PipelineData {
    /// Current image: the region's luminance on entry, the binary mask after thresholding
    pub image: DynamicImage,

    /// The extracted region (shared, never modified)
    pub original: Arc<RgbImage>,

    /// Where the region came from in the slide
    pub roi: Roi,

    /// Per-step measurements (e.g. "threshold_level", "foreground_pixels")
    pub metadata: HashMap<String, MetadataValue>,
}

/// Metadata value types
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Float(f64),
    Int(i64),
}

impl PipelineData {
    /// Create PipelineData for an extracted region. The RGB pixels are kept
    /// once, in `original`; the working image starts as their luminance.
    pub fn from_region(region: RgbImage, roi: Roi) -> Self {
        Self {
            image: DynamicImage::ImageLuma8(to_grayscale(&region)),
            original: Arc::new(region),
            roi,
            metadata: HashMap::new(),
        }
    }

    /// Replace the current image, keeping provenance and metadata
    pub fn with_image(mut self, image: DynamicImage) -> Self {
        self.image = image;
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Get metadata as float
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.metadata.get(key) {
            Some(MetadataValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get metadata as int
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.metadata.get(key) {
            Some(MetadataValue::Int(v)) => Some(*v),
            _ => None,
        }
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Context available to all pipeline steps
#[derive(Clone, Default)]
pub struct PipelineContext {
    pub debug: Option<DebugConfig>,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Process data and return transformed data, one output per input
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>>;

    /// Human-readable name for this step (used in logs and debug directory names)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(AnalysisError::invalid(format!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Run every step in order over all items
    pub fn run(&self, input: Vec<PipelineData>) -> Result<Vec<PipelineData>> {
        let mut data = input;

        for (step_idx, step) in self.steps.iter().enumerate() {
            let _span = tracing::debug_span!("step", name = step.name()).entered();
            tracing::debug!("Running step: {} (processing {} items)", step.name(), data.len());

            let expected = data.len();
            data = step.process(data, &self.context)?;
            if data.len() != expected {
                return Err(AnalysisError::processing(format!(
                    "step '{}' returned {} items for {} inputs",
                    step.name(),
                    data.len(),
                    expected
                )));
            }

            self.save_debug_outputs(step_idx, step.name(), &data)?;
        }

        Ok(data)
    }

    fn save_debug_outputs(&self, step_idx: usize, step_name: &str, data: &[PipelineData]) -> Result<()> {
        let Some(debug_config) = &self.context.debug else {
            return Ok(());
        };

        let step_dir_name = format!("{:02}_{}", step_idx + 1, step_name.to_lowercase().replace(' ', "_"));
        let step_dir = debug_config.output_dir.join(&step_dir_name);
        std::fs::create_dir_all(&step_dir)?;

        for (idx, item) in data.iter().enumerate() {
            let output_path = step_dir.join(format!("{:02}.png", idx + 1));
            item.image.save(&output_path)?;
        }

        tracing::debug!("Debug: saved {} images to {}/", data.len(), step_dir_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};

    struct InvertStep;

    impl PipelineStep for InvertStep {
        fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
            Ok(data
                .into_iter()
                .map(|item| {
                    let mut gray = item.image.to_luma8();
                    image::imageops::invert(&mut gray);
                    item.with_image(DynamicImage::ImageLuma8(gray))
                })
                .collect())
        }

        fn name(&self) -> &str {
            "Invert"
        }
    }

    struct DropAllStep;

    impl PipelineStep for DropAllStep {
        fn process(&self, _data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "Drop All"
        }
    }

    fn sample_data() -> PipelineData {
        PipelineData::from_region(RgbImage::from_pixel(3, 2, Rgb([0, 0, 0])), Roi::new(0, 0, 3, 2))
    }

    #[test]
    fn test_run_applies_steps_in_order() {
        let pipeline = Pipeline::new()
            .add_step(Arc::new(InvertStep))
            .add_step(Arc::new(InvertStep))
            .add_step(Arc::new(InvertStep));

        let out = pipeline.run(vec![sample_data()]).unwrap();
        assert_eq!(out[0].image.to_luma8(), GrayImage::from_pixel(3, 2, Luma([255])));

        let two = Pipeline::new().add_step(Arc::new(InvertStep)).add_step(Arc::new(InvertStep));
        let out = two.run(vec![sample_data()]).unwrap();
        assert_eq!(out[0].image.to_luma8(), GrayImage::from_pixel(3, 2, Luma([0])));
    }

    #[test]
    fn test_from_region_starts_from_luminance() {
        let region = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let data = PipelineData::from_region(region, Roi::new(0, 0, 2, 2));
        // Red is 76 under ITU-R 601 weights; the RGB copy lives only in `original`
        assert_eq!(data.image.as_luma8(), Some(&GrayImage::from_pixel(2, 2, Luma([76]))));
        assert_eq!(*data.original.get_pixel(1, 1), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_step_must_preserve_item_count() {
        let pipeline = Pipeline::new().add_step(Arc::new(DropAllStep));
        let result = pipeline.run(vec![sample_data()]);
        assert!(matches!(result, Err(AnalysisError::ProcessingFailure(_))));
    }

    #[test]
    fn test_debug_outputs_written_per_step() {
        let dir = tempfile::TempDir::new().unwrap();
        let debug_dir = dir.path().join("debug");
        let pipeline = Pipeline::new()
            .add_step(Arc::new(InvertStep))
            .with_debug(debug_dir.clone())
            .unwrap();

        pipeline.run(vec![sample_data(), sample_data()]).unwrap();
        assert!(debug_dir.join("01_invert").join("01.png").exists());
        assert!(debug_dir.join("01_invert").join("02.png").exists());
    }

    #[test]
    fn test_debug_dir_must_be_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("leftover.txt"), b"x").unwrap();
        let result = Pipeline::new().with_debug(dir.path().to_path_buf());
        assert!(matches!(result, Err(AnalysisError::InvalidArgument(_))));
    }

    #[test]
    fn test_metadata_accessors() {
        let data = sample_data()
            .with_metadata("threshold_level", MetadataValue::Float(12.5))
            .with_metadata("foreground_pixels", MetadataValue::Int(4));
        assert_eq!(data.get_float("threshold_level"), Some(12.5));
        assert_eq!(data.get_int("foreground_pixels"), Some(4));
        assert_eq!(data.get_int("threshold_level"), None);
    }
}
