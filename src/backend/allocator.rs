//! Raw buffer allocation.

use crate::pipeline::buffer::FrameBuffer;
use crate::types::FrameDescriptor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("no memory for {0} byte buffer")]
    NoMemory(usize),

    #[error("invalid buffer geometry {width}x{height} (stride {stride})")]
    InvalidGeometry { width: u32, height: u32, stride: u32 },
}

/// Allocates physical frame buffers for unit pools.
#[cfg_attr(test, mockall::automock)]
pub trait BufferAllocator: Send + Sync {
    /// Allocate one buffer with the given width, height, stride and format.
    fn allocate(&self, desc: &FrameDescriptor) -> Result<Arc<FrameBuffer>, AllocError>;
}

/// Heap-backed allocator with an optional cap on live allocations.
///
/// The cap counts every buffer ever handed out, which makes it suitable for
/// simulating memory pressure in tests and on constrained targets.
#[derive(Debug, Default)]
pub struct HeapAllocator {
    limit: Option<usize>,
    allocated: AtomicUsize,
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `NoMemory` once `limit` buffers have been allocated.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            allocated: AtomicUsize::new(0),
        }
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl BufferAllocator for HeapAllocator {
    fn allocate(&self, desc: &FrameDescriptor) -> Result<Arc<FrameBuffer>, AllocError> {
        if desc.width == 0 || desc.height == 0 || desc.stride < desc.width {
            return Err(AllocError::InvalidGeometry {
                width: desc.width,
                height: desc.height,
                stride: desc.stride,
            });
        }

        let previous = self.allocated.fetch_add(1, Ordering::AcqRel);
        if let Some(limit) = self.limit {
            if previous >= limit {
                self.allocated.fetch_sub(1, Ordering::AcqRel);
                return Err(AllocError::NoMemory(desc.size));
            }
        }

        Ok(Arc::new(FrameBuffer::new(*desc)))
    }
}
