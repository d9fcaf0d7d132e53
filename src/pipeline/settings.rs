//! Per-frame processing settings.
//!
//! One `ProcessingSettings` value is created per input frame and shared by
//! reference (`Arc`) across every unit processing that frame.

use crate::types::{PixelFormat, Rect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Metadata a transform may need for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Correlates outputs with the request that asked for them
    pub request_id: u64,
    /// Capture timestamp of the input frame
    pub timestamp_ns: u64,
    /// Requested crop window in sensor coordinates, `None` for the full array
    pub crop_region: Option<Rect>,
    /// Overrides the configured JPEG quality
    pub jpeg_quality: Option<u8>,
    /// Format the requester expects, if it constrains the output
    pub target_format: Option<PixelFormat>,
}

impl ProcessingSettings {
    pub fn for_request(request_id: u64) -> Self {
        Self {
            request_id,
            ..Default::default()
        }
    }

    pub fn with_crop(mut self, crop: Rect) -> Self {
        self.crop_region = Some(crop);
        self
    }

    pub fn with_timestamp(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = Some(quality);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
