mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from wsiseg for tests
pub use wsiseg::{
    AnalysisError, ClassifierSession, ColorSample, Orchestrator, ProcessRequest, Roi, RoiResult, Service,
    ServiceConfig, UnknownOpPolicy,
};
