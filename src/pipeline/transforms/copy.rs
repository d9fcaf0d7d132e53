//! CopyTransform — gives a stream its own buffer identity.
//!
//! Copies `min(input, output)` bytes. When the output aliases the input (the
//! caller routed the input itself as this stream's buffer) nothing is copied.

use crate::pipeline::buffer::ProcBuffer;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::transform::TransformOutcome;

#[derive(Debug, Default, Clone, Copy)]
pub struct CopyTransform;

impl CopyTransform {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&mut self, input: &ProcBuffer, output: &ProcBuffer) -> PipelineResult<TransformOutcome> {
        copy_frame(input, output);
        Ok(TransformOutcome::Produced)
    }
}

/// Byte copy between two buffers, skipped when they are the same buffer.
/// Returns the number of bytes now valid in `output`.
pub(crate) fn copy_frame(input: &ProcBuffer, output: &ProcBuffer) -> usize {
    if input.same_buffer(output) {
        return input.frame().bytes_used();
    }
    let src = input.frame().read();
    let mut dst = output.frame().write();
    let len = input.frame().bytes_used().min(src.len()).min(dst.len());
    dst[..len].copy_from_slice(&src[..len]);
    drop(dst);
    output.frame().set_bytes_used(len);
    len
}
