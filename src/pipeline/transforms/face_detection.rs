//! FaceDetectionTap — pass-through analysis stage.
//!
//! The tap runs on the first level with an aliased output, so the frame it
//! "produces" is the input itself. Its only listener is the analysis
//! observer from [`crate::backend::Backends`]; the frame never reaches the
//! Output Join through this unit.

use crate::pipeline::buffer::ProcBuffer;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::transform::TransformOutcome;

#[derive(Debug, Default, Clone, Copy)]
pub struct FaceDetectionTap {
    frames_seen: u64,
}

impl FaceDetectionTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn process(&mut self, input: &ProcBuffer, output: &ProcBuffer) -> PipelineResult<TransformOutcome> {
        debug_assert!(input.same_buffer(output));
        self.frames_seen += 1;
        Ok(TransformOutcome::Produced)
    }
}
