pub mod morphology;
pub mod preprocessing;
pub mod steps;
pub mod threshold;

use crate::pipeline::Pipeline;
use morphology::MorphologyPipeline;
use std::sync::Arc;
use steps::{MorphologyStep, ThresholdStep};
use threshold::ThresholdMethod;

pub use morphology::{apply_morphology, MorphOp, UnknownOpPolicy};
pub use threshold::{apply_threshold, ThresholdType, ADAPTIVE_BLOCK_SIZE};

/// Threshold followed by morphology, as a runnable pipeline
pub fn build_segmentation_pipeline(method: ThresholdMethod, ops: MorphologyPipeline) -> Pipeline {
    Pipeline::new()
        .add_step(Arc::new(ThresholdStep { method }))
        .add_step(Arc::new(MorphologyStep { ops }))
}
