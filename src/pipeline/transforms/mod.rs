//! Built-in transform implementations.

pub mod copy;
pub mod digital_zoom;
pub mod face_detection;
pub mod jpeg;
pub mod lens_shading;
pub mod scale;

pub use copy::CopyTransform;
pub use digital_zoom::DigitalZoomTransform;
pub use face_detection::FaceDetectionTap;
pub use jpeg::JpegTransform;
pub use lens_shading::LensShadingTransform;
pub use scale::ScaleTransform;

use crate::pipeline::buffer::ProcBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};

/// Reject in-place processing for stages that read and write separate planes.
pub(crate) fn ensure_distinct(input: &ProcBuffer, output: &ProcBuffer) -> PipelineResult<()> {
    if input.same_buffer(output) {
        Err(PipelineError::InvalidConfiguration(format!(
            "in-place processing of {} is not supported",
            input.id()
        )))
    } else {
        Ok(())
    }
}
