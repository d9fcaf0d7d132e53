//! JPEG encoder engine contract and a software engine built on `image`.

use crate::imaging::{nv12, ImagingError};
use crate::pipeline::buffer::FrameBuffer;
use crate::pipeline::settings::ProcessingSettings;
use thiserror::Error;

/// Quality used when neither the configuration nor the frame sets one
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("encoder session could not be created: {0}")]
    Session(String),

    #[error("output buffer too small: encoded {encoded} bytes into {capacity}")]
    OutputTooSmall { encoded: usize, capacity: usize },

    #[error("encode failed: {0}")]
    Encode(String),

    #[error(transparent)]
    Imaging(#[from] ImagingError),
}

/// Factory for encoder sessions. A session is created once per unit and reused.
#[cfg_attr(test, mockall::automock)]
pub trait JpegEngine: Send + Sync {
    fn create_session(&self) -> Result<Box<dyn JpegSession>, EncoderError>;
}

/// One initialized encoder.
#[cfg_attr(test, mockall::automock)]
pub trait JpegSession: Send {
    /// Encode `input` into `output`, returning the number of bytes written.
    fn encode(
        &mut self,
        input: &FrameBuffer,
        output: &FrameBuffer,
        settings: &ProcessingSettings,
    ) -> Result<usize, EncoderError>;
}

/// CPU JPEG engine: semi-planar → RGB8 → baseline JPEG.
#[derive(Debug, Clone, Copy)]
pub struct SoftwareJpegEngine {
    quality: u8,
}

impl SoftwareJpegEngine {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for SoftwareJpegEngine {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl JpegEngine for SoftwareJpegEngine {
    fn create_session(&self) -> Result<Box<dyn JpegSession>, EncoderError> {
        Ok(Box::new(SoftwareJpegSession {
            quality: self.quality,
            scratch: Vec::new(),
        }))
    }
}

struct SoftwareJpegSession {
    quality: u8,
    scratch: Vec<u8>,
}

impl JpegSession for SoftwareJpegSession {
    fn encode(
        &mut self,
        input: &FrameBuffer,
        output: &FrameBuffer,
        settings: &ProcessingSettings,
    ) -> Result<usize, EncoderError> {
        let desc = *input.descriptor();
        let rgb = nv12::to_rgb(&input.read(), &desc)?;
        let quality = settings.jpeg_quality.unwrap_or(self.quality).clamp(1, 100);

        self.scratch.clear();
        {
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut self.scratch, quality);
            encoder
                .encode(&rgb, desc.width, desc.height, image::ExtendedColorType::Rgb8)
                .map_err(|e| EncoderError::Encode(e.to_string()))?;
        }

        let mut out = output.write();
        if self.scratch.len() > out.len() {
            return Err(EncoderError::OutputTooSmall {
                encoded: self.scratch.len(),
                capacity: out.len(),
            });
        }
        out[..self.scratch.len()].copy_from_slice(&self.scratch);
        drop(out);
        output.set_bytes_used(self.scratch.len());
        Ok(self.scratch.len())
    }
}
