//! Core data types for frame post-processing
//!
//! This module contains the frame and stream descriptions shared by the
//! pipeline, its collaborators and the configuration layer.
//!
//! # Main Types
//!
//! - [`PixelFormat`] - Pixel layout tag of a frame buffer
//! - [`FrameDescriptor`] - Geometry and size of one frame
//! - [`OutputStreamDescriptor`] - A requested output (size, format, rotation, identity)
//! - [`Rect`] - Crop rectangle, either in sensor or buffer coordinates
//! - [`Rotation`] - Clockwise rotation requested by a stream
//!
//! # Plane Layout
//!
//! Semi-planar formats (NV12/NV21) store a full-resolution luma plane of
//! `stride * height` bytes followed by an interleaved chroma plane of
//! `stride * height / 2` bytes.

use crate::pipeline::id::StreamId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PixelFormat {
    /// Y plane followed by interleaved Cb/Cr
    #[default]
    Nv12,
    /// Y plane followed by interleaved Cr/Cb
    Nv21,
    /// Packed 4:2:2 Y/Cb/Y/Cr
    Yuyv,
    /// Compressed payload (JPEG)
    Blob,
}

impl PixelFormat {
    /// Whether the format is one of the 4:2:0 semi-planar layouts
    pub fn is_semi_planar(self) -> bool {
        matches!(self, PixelFormat::Nv12 | PixelFormat::Nv21)
    }

    /// Whether the format carries a compressed bitstream
    pub fn is_compressed(self) -> bool {
        matches!(self, PixelFormat::Blob)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Nv21 => "NV21",
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Blob => "BLOB",
        };
        f.write_str(name)
    }
}

/// Clockwise rotation applied to a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Rotation {
    #[default]
    None,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Whether the rotation swaps width and height
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Rectangle with an origin, used for crop windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Rectangle anchored at the origin
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Round every component down to an even value
    pub fn even_aligned(self) -> Self {
        Self {
            left: self.left & !1,
            top: self.top & !1,
            width: self.width & !1,
            height: self.height & !1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether this rectangle lies inside a `width` x `height` area
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.left as u64 + self.width as u64 <= width as u64
            && self.top as u64 + self.height as u64 <= height as u64
    }
}

/// Geometry of a frame buffer. Immutable once a graph is built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    /// Bytes per luma row
    pub stride: u32,
    pub format: PixelFormat,
    /// Total buffer size in bytes
    pub size: usize,
}

impl FrameDescriptor {
    /// Tightly packed NV12 frame
    pub fn nv12(width: u32, height: u32) -> Self {
        Self::semi_planar(width, height, PixelFormat::Nv12)
    }

    /// Tightly packed semi-planar frame in the given layout
    pub fn semi_planar(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            stride: width,
            format,
            size: semi_planar_size(width, height),
        }
    }

    /// Compressed output buffer sized for the worst case of a `width` x `height` image
    pub fn blob(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stride: width,
            format: PixelFormat::Blob,
            size: semi_planar_size(width, height),
        }
    }

    /// Descriptor for a buffer of the given geometry and format
    pub fn with_format(width: u32, height: u32, format: PixelFormat) -> Self {
        match format {
            PixelFormat::Blob => Self::blob(width, height),
            PixelFormat::Yuyv => Self {
                width,
                height,
                stride: width * 2,
                format,
                size: width as usize * height as usize * 2,
            },
            _ => Self::semi_planar(width, height, format),
        }
    }

    /// Same geometry with an explicit buffer size
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Size of the luma plane in bytes
    pub fn luma_size(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    pub fn same_geometry(&self, other: &FrameDescriptor) -> bool {
        self.width == other.width && self.height == other.height
    }
}

fn semi_planar_size(width: u32, height: u32) -> usize {
    let luma = width as usize * height as usize;
    luma + luma / 2
}

/// A requested output stream. Supplied externally per configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputStreamDescriptor {
    /// Routing key for caller buffers and exits
    pub id: StreamId,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    #[serde(default)]
    pub rotation: Rotation,
}

impl OutputStreamDescriptor {
    pub fn new(id: StreamId, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            id,
            width,
            height,
            format,
            rotation: Rotation::None,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Whether this stream requires compressing the frame
    pub fn needs_encode(&self) -> bool {
        self.format.is_compressed()
    }

    /// Descriptor of the buffers delivered for this stream
    pub fn frame_descriptor(&self) -> FrameDescriptor {
        FrameDescriptor::with_format(self.width, self.height, self.format)
    }
}
