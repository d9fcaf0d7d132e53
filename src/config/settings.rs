//! Platform capabilities the graph builder plans against
//!
//! These describe what the camera platform offers, not what a particular
//! frame asks for. Per-frame parameters travel in
//! [`crate::pipeline::ProcessingSettings`].

use crate::types::Rect;
use serde::{Deserialize, Serialize};

/// Default sensor active pixel array
pub const DEFAULT_ACTIVE_ARRAY: Rect = Rect::full(1920, 1080);

/// Capability flags and metadata of the camera platform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformCapabilities {
    /// Maximum digital zoom ratio; above 1.0 adds a digital zoom stage
    pub max_digital_zoom: f32,
    /// Sensor area crop windows are expressed in
    pub active_pixel_array: Rect,
    /// Run lens shading correction in software
    pub software_lsc: bool,
    /// Feed the input to the face-detection observer
    pub face_detection: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            max_digital_zoom: 1.0,
            active_pixel_array: DEFAULT_ACTIVE_ARRAY,
            software_lsc: false,
            face_detection: false,
        }
    }
}

impl PlatformCapabilities {
    pub fn supports_digital_zoom(&self) -> bool {
        self.max_digital_zoom > 1.0
    }
}
