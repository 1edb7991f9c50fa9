//! Pipeline error types.

use adsp_errors::AdspError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Worker thread could not be spawned.
    #[error("Failed to spawn pipeline worker: {0}")]
    Spawn(String),

    /// The transfer hardware rejected a block.
    #[error("Transport rejected block: {0}")]
    Transport(String),

    /// The worker panicked.
    #[error("Pipeline worker '{0}' panicked")]
    WorkerPanicked(String),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

impl From<PipelineError> for AdspError {
    fn from(e: PipelineError) -> Self {
        AdspError::Pipeline(e.to_string())
    }
}
