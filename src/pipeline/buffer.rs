//! Frame buffers and the handles that flow through the processing graph.
//!
//! A [`FrameBuffer`] is one physical allocation. A [`ProcBuffer`] is a cheap,
//! cloneable handle to it that additionally carries the stream it was
//! supplied for and, for pool-owned buffers, the slot guard that returns the
//! allocation to its pool once the last clone is dropped.

use crate::pipeline::id::{BufferId, StreamId};
use crate::pipeline::pool::PoolSlot;
use crate::types::FrameDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Who supplies and reclaims a unit's output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferMode {
    /// Output drawn from the unit's private pool and recycled on drop
    Pool,
    /// Output supplied by the outer consumer through `add_output_buffer`
    Caller,
    /// Output is the input buffer itself (pass-through)
    Aliased,
}

impl fmt::Display for BufferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferMode::Pool => "pool",
            BufferMode::Caller => "caller",
            BufferMode::Aliased => "aliased",
        };
        f.write_str(name)
    }
}

/// One physical frame allocation.
pub struct FrameBuffer {
    id: BufferId,
    desc: FrameDescriptor,
    data: RwLock<Vec<u8>>,
    bytes_used: AtomicUsize,
}

impl FrameBuffer {
    /// Zero-filled buffer sized from the descriptor
    pub fn new(desc: FrameDescriptor) -> Self {
        Self::from_bytes(desc, vec![0u8; desc.size])
    }

    /// Wrap existing bytes. The buffer is considered fully used.
    pub fn from_bytes(desc: FrameDescriptor, bytes: Vec<u8>) -> Self {
        let used = bytes.len();
        Self {
            id: BufferId::next(),
            desc,
            data: RwLock::new(bytes),
            bytes_used: AtomicUsize::new(used),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn descriptor(&self) -> &FrameDescriptor {
        &self.desc
    }

    /// Allocated size in bytes
    pub fn capacity(&self) -> usize {
        self.read().len()
    }

    /// Number of meaningful bytes, smaller than capacity for compressed payloads
    pub fn bytes_used(&self) -> usize {
        self.bytes_used.load(Ordering::Acquire)
    }

    pub fn set_bytes_used(&self, used: usize) {
        self.bytes_used.store(used, Ordering::Release);
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the used bytes
    pub fn to_vec(&self) -> Vec<u8> {
        let data = self.read();
        let used = self.bytes_used().min(data.len());
        data[..used].to_vec()
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .field("bytes_used", &self.bytes_used())
            .finish()
    }
}

/// Handle to a physical buffer flowing through the graph.
///
/// Cloning shares the physical buffer. For pool-owned buffers the slot is
/// returned to its pool when the last clone is dropped.
#[derive(Clone)]
pub struct ProcBuffer {
    index: usize,
    frame: Arc<FrameBuffer>,
    origin: Option<StreamId>,
    slot: Option<Arc<PoolSlot>>,
}

impl ProcBuffer {
    /// Borrowed handle to a buffer owned elsewhere (input frames)
    pub fn wrap(frame: Arc<FrameBuffer>) -> Self {
        Self {
            index: 0,
            frame,
            origin: None,
            slot: None,
        }
    }

    /// Caller-owned output buffer for the given stream
    pub fn for_stream(frame: Arc<FrameBuffer>, stream: StreamId) -> Self {
        Self {
            index: 0,
            frame,
            origin: Some(stream),
            slot: None,
        }
    }

    pub(crate) fn pooled(slot: Arc<PoolSlot>) -> Self {
        Self {
            index: slot.index(),
            frame: Arc::clone(slot.frame()),
            origin: None,
            slot: Some(slot),
        }
    }

    /// Same physical buffer, tagged with a stream identity
    pub fn with_origin(mut self, stream: StreamId) -> Self {
        self.origin = Some(stream);
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> BufferId {
        self.frame.id()
    }

    pub fn frame(&self) -> &Arc<FrameBuffer> {
        &self.frame
    }

    pub fn descriptor(&self) -> &FrameDescriptor {
        self.frame.descriptor()
    }

    pub fn origin(&self) -> Option<StreamId> {
        self.origin
    }

    pub fn is_pooled(&self) -> bool {
        self.slot.is_some()
    }

    /// Whether both handles refer to the same physical buffer
    pub fn same_buffer(&self, other: &ProcBuffer) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for ProcBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcBuffer")
            .field("index", &self.index)
            .field("id", &self.id())
            .field("origin", &self.origin)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}
