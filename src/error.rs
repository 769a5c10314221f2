/// Failure taxonomy shared by extraction, segmentation and the classifier session.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// A slide file or a model identifier does not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad ROI geometry, unknown threshold type, malformed training input, ...
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Anything that went wrong while doing the actual work.
    #[error("processing failure: {0}")]
    ProcessingFailure(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::ProcessingFailure(msg.into())
    }

    /// Stable snake_case name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::ProcessingFailure(_) => "processing_failure",
        }
    }
}

impl From<image::ImageError> for AnalysisError {
    fn from(err: image::ImageError) -> Self {
        Self::ProcessingFailure(format!("image error: {}", err))
    }
}

impl From<std::io::Error> for AnalysisError {
    fn from(err: std::io::Error) -> Self {
        Self::ProcessingFailure(format!("I/O error: {}", err))
    }
}
