pub mod classifier;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod segmentation;
pub mod service;
pub mod slide;
pub mod tiling;

pub use error::{AnalysisError, Result};
pub use models::{ColorSample, ProcessRequest, Roi, RoiResult, TrainOutcome};
pub use pipeline::{
    Pipeline, PipelineData, PipelineStep, PipelineContext,
    MetadataValue, DebugConfig
};
pub use classifier::{ClassifierSession, EvictionPolicy, InMemoryModelStore, ModelStore};
pub use config::{ServiceConfig, TrainingConfig};
pub use orchestrator::Orchestrator;
pub use segmentation::{ThresholdType, UnknownOpPolicy};
pub use service::Service;
pub use slide::{extract_region, ImageSlideSource, SlideFileSource, SlideSource, TiffSlideSource};
