use thiserror::Error;
use video_ingest::CaptureError;

/// Failures that stop the pipeline or prevent it from starting.
///
/// Per-cycle capture gaps and stream consumer timeouts are not represented
/// here: they are recovered where they happen.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Model, labels, or engine configuration could not be loaded.
    #[error("detector initialisation failed: {0:#}")]
    Initialization(anyhow::Error),
    /// The frame source could not be opened.
    #[error("frame source unavailable: {0}")]
    ResourceUnavailable(#[source] CaptureError),
    /// The backend failed mid-run; the engine cannot continue.
    #[error("inference backend failed: {0:#}")]
    Inference(anyhow::Error),
    #[error("pipeline is already running")]
    AlreadyRunning,
}

impl PipelineError {
    /// Whether the error came from the backend rather than from setup.
    pub fn is_inference(&self) -> bool {
        matches!(self, PipelineError::Inference(_))
    }
}
