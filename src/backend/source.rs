//! Input frame sources.
//!
//! A source owns a fixed-depth ring of device buffers, mirroring a capture
//! node that dequeues from a fixed set of hardware buffers. A buffer can only
//! be handed out again once every handle to it has been dropped.

use crate::error::{Error, Result};
use crate::pipeline::buffer::FrameBuffer;
use crate::types::FrameDescriptor;
use std::sync::Arc;

/// Default number of device buffers in flight
pub const DEFAULT_SOURCE_DEPTH: usize = 4;

/// Supplies the pipeline's input frames. The format is fixed between reconfigurations.
pub trait FrameSource: Send {
    fn get_frame(&mut self) -> Result<(Arc<FrameBuffer>, FrameDescriptor)>;

    fn descriptor(&self) -> FrameDescriptor;
}

/// Synthetic semi-planar source producing a moving gradient.
pub struct TestPatternSource {
    desc: FrameDescriptor,
    ring: Vec<Arc<FrameBuffer>>,
    next: usize,
    sequence: u64,
}

impl TestPatternSource {
    pub fn new(desc: FrameDescriptor, depth: usize) -> Result<Self> {
        if !desc.format.is_semi_planar() {
            return Err(Error::Source(format!(
                "test pattern requires a semi-planar format, got {}",
                desc.format
            )));
        }
        if depth == 0 {
            return Err(Error::Source("source depth must be non-zero".into()));
        }
        let ring = (0..depth)
            .map(|_| Arc::new(FrameBuffer::new(desc)))
            .collect();
        Ok(Self {
            desc,
            ring,
            next: 0,
            sequence: 0,
        })
    }

    /// Frames produced so far
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn paint(&self, frame: &FrameBuffer) {
        let (w, h, stride) = (
            self.desc.width as usize,
            self.desc.height as usize,
            self.desc.stride as usize,
        );
        let shift = self.sequence as usize;
        let mut data = frame.write();
        for y in 0..h {
            for x in 0..w {
                data[y * stride + x] = ((x + y + shift) & 0xFF) as u8;
            }
        }
        let uv_base = stride * h;
        for y in 0..h / 2 {
            for x in (0..w).step_by(2) {
                data[uv_base + y * stride + x] = ((x + shift) & 0xFF) as u8;
                data[uv_base + y * stride + x + 1] = ((y * 2) & 0xFF) as u8;
            }
        }
    }
}

impl FrameSource for TestPatternSource {
    fn get_frame(&mut self) -> Result<(Arc<FrameBuffer>, FrameDescriptor)> {
        let frame = &self.ring[self.next];
        if Arc::strong_count(frame) > 1 {
            return Err(Error::Source(format!(
                "device buffer {} still in flight",
                self.next
            )));
        }
        let frame = Arc::clone(frame);
        self.paint(&frame);
        self.next = (self.next + 1) % self.ring.len();
        self.sequence += 1;
        Ok((frame, self.desc))
    }

    fn descriptor(&self) -> FrameDescriptor {
        self.desc
    }
}
