//! Pipeline-specific error types.
//!
//! Errors are `Clone` because a per-frame status fans out together with the
//! buffer it describes: every listener of a unit receives its own copy.

use crate::types::PixelFormat;
use thiserror::Error;

/// Errors that can occur within the processing graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Buffer or stage resource creation failed during `prepare`
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// Buffer pool exhausted or failed to initialize
    #[error("Buffer pool error: {0}")]
    Pool(String),

    /// Operation not valid for the current graph or unit mode
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// JPEG session creation or encode failure
    #[error("Encode error: {0}")]
    Encode(String),

    /// Transform given a pixel format it cannot handle
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(PixelFormat),

    /// Input dropped because no output buffer was available
    #[error("Frame dropped: no output buffer available")]
    ProcessingDropped,

    /// Transform failed without a local fallback
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    /// Frame discarded by a flush before it was produced
    #[error("Frame flushed")]
    Flushed,

    /// Runtime operation issued before a graph was built
    #[error("Pipeline not configured")]
    NotConfigured,
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Outcome of one frame, carried with the buffer through every `notify`.
pub type FrameStatus = std::result::Result<(), PipelineError>;

/// Keep the first failure, never short-circuit.
pub(crate) fn combine_status(acc: FrameStatus, next: FrameStatus) -> FrameStatus {
    match acc {
        Ok(()) => next,
        Err(e) => Err(e),
    }
}
