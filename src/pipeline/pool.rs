//! Fixed-capacity pool of reusable frame buffers.
//!
//! Slots circulate through a bounded free list. [`BufferPool::acquire`] pops
//! one without blocking; the slot returns to the free list automatically when
//! the last [`ProcBuffer`] clone referencing it is dropped. There is no
//! explicit release call, so a buffer cannot be forgotten.

use crate::backend::allocator::BufferAllocator;
use crate::pipeline::buffer::{FrameBuffer, ProcBuffer};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::types::FrameDescriptor;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;

type FreeEntry = (usize, Arc<FrameBuffer>);

/// Loan of one pool slot. Dropping it puts the buffer back on the free list.
pub struct PoolSlot {
    index: usize,
    frame: Arc<FrameBuffer>,
    free: Sender<FreeEntry>,
}

impl PoolSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn frame(&self) -> &Arc<FrameBuffer> {
        &self.frame
    }
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        // Fails only when the pool itself is gone, in which case the buffer is freed.
        let _ = self.free.try_send((self.index, Arc::clone(&self.frame)));
    }
}

/// Pre-allocated set of buffers owned by one processing unit.
pub struct BufferPool {
    capacity: usize,
    desc: FrameDescriptor,
    free_tx: Sender<FreeEntry>,
    free_rx: Receiver<FreeEntry>,
}

impl BufferPool {
    /// Allocate `count` buffers described by `desc`.
    pub fn create(
        count: usize,
        desc: FrameDescriptor,
        allocator: &dyn BufferAllocator,
    ) -> PipelineResult<Self> {
        if count == 0 {
            return Err(PipelineError::Pool("pool capacity must be non-zero".into()));
        }

        let (free_tx, free_rx) = bounded(count);
        for index in 0..count {
            let frame = allocator.allocate(&desc).map_err(|e| {
                PipelineError::Pool(format!("slot {}/{} allocation failed: {}", index, count, e))
            })?;
            free_tx
                .try_send((index, frame))
                .map_err(|_| PipelineError::Pool("free list overflow".into()))?;
        }

        tracing::debug!(
            "Created buffer pool: {} x {}x{} {}",
            count,
            desc.width,
            desc.height,
            desc.format
        );

        Ok(Self {
            capacity: count,
            desc,
            free_tx,
            free_rx,
        })
    }

    /// Next free buffer, or `None` when every slot is checked out.
    pub fn acquire(&self) -> Option<ProcBuffer> {
        let (index, frame) = self.free_rx.try_recv().ok()?;
        frame.set_bytes_used(frame.capacity());
        let slot = PoolSlot {
            index,
            frame,
            free: self.free_tx.clone(),
        };
        Some(ProcBuffer::pooled(Arc::new(slot)))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.free_rx.len()
    }

    /// Number of slots currently checked out
    pub fn outstanding(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn descriptor(&self) -> &FrameDescriptor {
        &self.desc
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}
