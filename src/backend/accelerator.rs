//! 2D crop/scale/rotate accelerator contract and software implementations.

use crate::imaging::{nv12, ImagingError};
use crate::pipeline::buffer::FrameBuffer;
use crate::types::{Rect, Rotation};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcceleratorError {
    #[error("accelerator unavailable")]
    Unavailable,

    #[error("source and destination are the same buffer")]
    InPlace,

    #[error("accelerator rejected request: {0}")]
    Rejected(String),

    #[error(transparent)]
    Imaging(#[from] ImagingError),
}

/// Synchronous crop-and-scale engine.
///
/// Crops `crop` (in source pixel coordinates) out of `src`, scales it to the
/// full destination geometry and applies `rotation`. No ownership transfer.
#[cfg_attr(test, mockall::automock)]
pub trait CropScaler: Send + Sync {
    fn crop_scale(
        &self,
        src: &FrameBuffer,
        crop: Rect,
        dst: &FrameBuffer,
        rotation: Rotation,
    ) -> Result<(), AcceleratorError>;
}

/// CPU crop/scale on semi-planar frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareScaler;

impl CropScaler for SoftwareScaler {
    fn crop_scale(
        &self,
        src: &FrameBuffer,
        crop: Rect,
        dst: &FrameBuffer,
        rotation: Rotation,
    ) -> Result<(), AcceleratorError> {
        if src.id() == dst.id() {
            return Err(AcceleratorError::InPlace);
        }
        let input = src.read();
        let mut output = dst.write();
        nv12::crop_scale(
            &input,
            src.descriptor(),
            crop,
            &mut output,
            dst.descriptor(),
            rotation,
        )?;
        Ok(())
    }
}

/// Placeholder for platforms without a 2D engine. Every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableScaler;

impl CropScaler for UnavailableScaler {
    fn crop_scale(
        &self,
        _src: &FrameBuffer,
        _crop: Rect,
        _dst: &FrameBuffer,
        _rotation: Rotation,
    ) -> Result<(), AcceleratorError> {
        Err(AcceleratorError::Unavailable)
    }
}
