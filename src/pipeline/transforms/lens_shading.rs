//! LensShadingTransform — software vignetting correction on the luma plane.
//!
//! The gain map is generated for the output geometry in `prepare` and
//! regenerated if a frame of a different geometry arrives. Chroma rows are
//! copied through unchanged.

use super::ensure_distinct;
use crate::imaging::lsc::{BlockSizing, GainMap, GREEN_SAMPLES};
use crate::pipeline::buffer::ProcBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::transform::TransformOutcome;
use crate::types::FrameDescriptor;

pub struct LensShadingTransform {
    sizing: BlockSizing,
    map: Option<GainMap>,
}

impl LensShadingTransform {
    pub fn new(sizing: BlockSizing) -> Self {
        Self { sizing, map: None }
    }

    pub fn gain_map(&self) -> Option<&GainMap> {
        self.map.as_ref()
    }

    pub fn check_format(input: &FrameDescriptor, output: &FrameDescriptor) -> bool {
        input.format.is_semi_planar() && output.format.is_semi_planar()
    }

    pub fn prepare(&mut self, input: &FrameDescriptor, output: &FrameDescriptor) -> PipelineResult<()> {
        if !Self::check_format(input, output) {
            return Err(PipelineError::InvalidConfiguration(format!(
                "lens shading needs semi-planar buffers, got {} -> {}",
                input.format, output.format
            )));
        }
        self.ensure_map(output.width, output.height);
        Ok(())
    }

    fn ensure_map(&mut self, width: u32, height: u32) -> &GainMap {
        let stale = !matches!(&self.map, Some(m) if m.width() == width && m.height() == height);
        if stale {
            self.map = None;
        }
        let sizing = self.sizing;
        self.map.get_or_insert_with(|| {
            tracing::debug!("Generating lens shading map for {}x{}", width, height);
            GainMap::generate(width, height, sizing, &GREEN_SAMPLES)
        })
    }

    pub fn process(&mut self, input: &ProcBuffer, output: &ProcBuffer) -> PipelineResult<TransformOutcome> {
        let (in_desc, out_desc) = (*input.descriptor(), *output.descriptor());
        if !in_desc.format.is_semi_planar() {
            return Err(PipelineError::UnsupportedFormat(in_desc.format));
        }
        if !out_desc.format.is_semi_planar() {
            return Err(PipelineError::UnsupportedFormat(out_desc.format));
        }
        if !in_desc.same_geometry(&out_desc) {
            return Err(PipelineError::ProcessingFailed(format!(
                "lens shading cannot resize {}x{} to {}x{}",
                in_desc.width, in_desc.height, out_desc.width, out_desc.height
            )));
        }
        ensure_distinct(input, output)?;

        let map = self.ensure_map(out_desc.width, out_desc.height);
        let src = input.frame().read();
        let mut dst = output.frame().write();
        let (src_stride, dst_stride) = (in_desc.stride as usize, out_desc.stride as usize);
        let (w, h) = (in_desc.width as usize, in_desc.height as usize);
        if src.len() < src_stride * h + src_stride * h / 2 || dst.len() < dst_stride * h + dst_stride * h / 2 {
            return Err(PipelineError::ProcessingFailed("lens shading buffer too small".into()));
        }

        map.apply_luma(&src, src_stride, &mut dst, dst_stride);

        let (src_uv, dst_uv) = (src_stride * h, dst_stride * h);
        for row in 0..h / 2 {
            let s = src_uv + row * src_stride;
            let d = dst_uv + row * dst_stride;
            dst[d..d + w].copy_from_slice(&src[s..s + w]);
        }
        drop(dst);
        output.frame().set_bytes_used(out_desc.size);
        Ok(TransformOutcome::Produced)
    }
}
