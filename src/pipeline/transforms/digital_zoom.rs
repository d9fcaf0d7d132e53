//! DigitalZoomTransform — crops the requested sensor-space window out of the
//! frame and scales it back to full size.
//!
//! The crop window arrives in active-pixel-array coordinates and is mapped
//! to buffer coordinates by ratio. The accelerator does the work; when it
//! fails the software bilinear path produces the same crop at the same size.
//! A window covering the whole array is a plain copy.

use super::copy::copy_frame;
use super::ensure_distinct;
use crate::backend::CropScaler;
use crate::imaging::nv12;
use crate::pipeline::buffer::ProcBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::settings::ProcessingSettings;
use crate::pipeline::transform::TransformOutcome;
use crate::types::{FrameDescriptor, Rect, Rotation};
use std::sync::Arc;

pub struct DigitalZoomTransform {
    scaler: Arc<dyn CropScaler>,
    active_array: Rect,
    fallbacks: u64,
}

impl DigitalZoomTransform {
    pub fn new(scaler: Arc<dyn CropScaler>, active_array: Rect) -> Self {
        Self {
            scaler,
            active_array,
            fallbacks: 0,
        }
    }

    /// Frames that went through the software path
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks
    }

    pub fn check_format(input: &FrameDescriptor, output: &FrameDescriptor) -> bool {
        input.format.is_semi_planar() && output.format.is_semi_planar()
    }

    pub fn process(
        &mut self,
        input: &ProcBuffer,
        output: &ProcBuffer,
        settings: &ProcessingSettings,
    ) -> PipelineResult<TransformOutcome> {
        let crop = settings.crop_region.unwrap_or(self.active_array);
        if crop == self.active_array {
            copy_frame(input, output);
            return Ok(TransformOutcome::Produced);
        }

        let (in_desc, out_desc) = (*input.descriptor(), *output.descriptor());
        if !Self::check_format(&in_desc, &out_desc) {
            let bad = if in_desc.format.is_semi_planar() {
                out_desc.format
            } else {
                in_desc.format
            };
            return Err(PipelineError::UnsupportedFormat(bad));
        }
        ensure_distinct(input, output)?;

        let mapped = map_crop(crop, self.active_array, in_desc.width, in_desc.height);
        if mapped.is_empty() {
            return Err(PipelineError::ProcessingFailed(format!(
                "zoom window {:?} maps to an empty region",
                crop
            )));
        }

        if let Err(e) = self
            .scaler
            .crop_scale(input.frame(), mapped, output.frame(), Rotation::None)
        {
            tracing::warn!("Digital zoom accelerator failed ({}), using software path", e);
            self.fallbacks += 1;
            let src = input.frame().read();
            let mut dst = output.frame().write();
            nv12::crop_scale(&src, &in_desc, mapped, &mut dst, &out_desc, Rotation::None)
                .map_err(|e| PipelineError::ProcessingFailed(format!("software zoom: {}", e)))?;
        }
        output.frame().set_bytes_used(out_desc.size);
        Ok(TransformOutcome::Produced)
    }
}

/// Map a sensor-space window onto a `width` x `height` buffer by ratio.
/// All four components are rounded down to even, and the result is clipped to the buffer.
pub fn map_crop(crop: Rect, active_array: Rect, width: u32, height: u32) -> Rect {
    let apa_w = active_array.width.max(1) as f32;
    let apa_h = active_array.height.max(1) as f32;
    let w_ratio = crop.width as f32 / apa_w;
    let h_ratio = crop.height as f32 / apa_h;
    let h_offset = crop.left as f32 / apa_w;
    let v_offset = crop.top as f32 / apa_h;

    let mapped = Rect::new(
        (width as f32 * h_offset) as u32,
        (height as f32 * v_offset) as u32,
        (width as f32 * w_ratio) as u32,
        (height as f32 * h_ratio) as u32,
    )
    .even_aligned();

    let left = mapped.left.min(width);
    let top = mapped.top.min(height);
    Rect::new(
        left,
        top,
        mapped.width.min(width - left) & !1,
        mapped.height.min(height - top) & !1,
    )
}
