use crate::classifier::store::EvictionPolicy;
use crate::segmentation::UnknownOpPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound on `epochs` for a single training request
pub const MAX_EPOCHS: usize = 10_000;

/// Optimizer settings for the color classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Full passes over the training set
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2_penalty: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            learning_rate: 0.5,
            l2_penalty: 1e-4,
        }
    }
}

/// Runtime configuration shared by the CLI and the service loop
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub unknown_op_policy: UnknownOpPolicy,
    pub eviction: EvictionPolicy,
    pub training: TrainingConfig,
    /// Write intermediate masks here (must be empty or absent)
    pub debug_dir: Option<PathBuf>,
}
