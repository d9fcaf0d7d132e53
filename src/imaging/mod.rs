//! Raw pixel kernels used by the software paths of the processing units.
//!
//! - [`nv12`] - crop, bilinear scale, rotation and RGB conversion of
//!   semi-planar 4:2:0 frames
//! - [`lsc`] - lens-shading gain map generation and application

pub mod lsc;
pub mod nv12;

use crate::types::PixelFormat;
use fast_image_resize as fir;
use thiserror::Error;

/// Errors raised by the software pixel kernels
#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("unsupported pixel format {0}")]
    UnsupportedFormat(PixelFormat),

    #[error("crop {width}x{height}+{left}+{top} outside {frame_width}x{frame_height} frame")]
    InvalidCrop {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    #[error("buffer too small: need {needed} bytes, have {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("resize failed: {0}")]
    Resize(#[from] fir::ResizeError),

    #[error("image buffer rejected: {0}")]
    ImageBuffer(#[from] fir::ImageBufferError),
}
