//! ScaleTransform — centred crop to the destination aspect ratio, then
//! accelerator crop-scale (and rotation) into the destination.
//!
//! Serves two stages: the stream-specific scaler and the common
//! crop-rotate-scale stage used when a stream asks for rotation.

use super::ensure_distinct;
use crate::backend::CropScaler;
use crate::pipeline::buffer::ProcBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::transform::{TransformKind, TransformOutcome};
use crate::types::{FrameDescriptor, Rect, Rotation};
use std::sync::Arc;

pub struct ScaleTransform {
    scaler: Arc<dyn CropScaler>,
    rotation: Rotation,
    kind: TransformKind,
}

impl ScaleTransform {
    /// Stream-specific resize
    pub fn scale_rotate(scaler: Arc<dyn CropScaler>) -> Self {
        Self {
            scaler,
            rotation: Rotation::None,
            kind: TransformKind::ScaleRotate,
        }
    }

    /// Common stage rotating every stream by `rotation`
    pub fn crop_rotate_scale(scaler: Arc<dyn CropScaler>, rotation: Rotation) -> Self {
        Self {
            scaler,
            rotation,
            kind: TransformKind::CropRotateScale,
        }
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn check_format(input: &FrameDescriptor, output: &FrameDescriptor) -> bool {
        input.format.is_semi_planar() && output.format.is_semi_planar()
    }

    pub fn process(&mut self, input: &ProcBuffer, output: &ProcBuffer) -> PipelineResult<TransformOutcome> {
        let (in_desc, out_desc) = (input.descriptor(), output.descriptor());
        if !Self::check_format(in_desc, out_desc) {
            let bad = if in_desc.format.is_semi_planar() {
                out_desc.format
            } else {
                in_desc.format
            };
            return Err(PipelineError::UnsupportedFormat(bad));
        }
        ensure_distinct(input, output)?;

        // Aspect ratio of the destination before rotation
        let (target_w, target_h) = if self.rotation.swaps_axes() {
            (out_desc.height, out_desc.width)
        } else {
            (out_desc.width, out_desc.height)
        };
        let crop = centered_crop(in_desc.width, in_desc.height, target_w, target_h);

        self.scaler
            .crop_scale(input.frame(), crop, output.frame(), self.rotation)
            .map_err(|e| PipelineError::ProcessingFailed(format!("{} crop-scale: {}", self.kind, e)))?;
        output.frame().set_bytes_used(out_desc.size);
        Ok(TransformOutcome::Produced)
    }
}

/// Largest centred region of an `in_w` x `in_h` frame with the aspect ratio
/// of `out_w` x `out_h`. Dimensions and offsets are rounded down to even.
pub fn centered_crop(in_w: u32, in_h: u32, out_w: u32, out_h: u32) -> Rect {
    let (iw, ih, ow, oh) = (in_w as u64, in_h as u64, out_w.max(1) as u64, out_h.max(1) as u64);

    // in_w / in_h < out_w / out_h, cross-multiplied to stay exact
    let (crop_w, crop_h) = if iw * oh < ow * ih {
        (iw, iw * oh / ow)
    } else {
        (ih * ow / oh, ih)
    };
    let crop_w = crop_w.min(iw) as u32 & !1;
    let crop_h = crop_h.min(ih) as u32 & !1;

    Rect::new(
        ((in_w - crop_w) / 2) & !1,
        ((in_h - crop_h) / 2) & !1,
        crop_w,
        crop_h,
    )
}
