//! Thread boundary between the processing graph and the outer consumer.
//!
//! The Output Join hands finished buffers to a [`FrameConsumer`]. It is
//! called from unit worker threads, so implementations must not block for
//! long. [`ChannelConsumer`] forwards every delivery over a crossbeam channel
//! to a [`FrameReceiver`] owned by the consuming thread.

use crate::pipeline::buffer::{BufferMode, ProcBuffer};
use crate::pipeline::error::{FrameStatus, PipelineError, PipelineResult};
use crate::pipeline::id::{EdgeId, StreamId, UnitId};
use crate::pipeline::settings::ProcessingSettings;
use crate::pipeline::transform::TransformKind;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Receives finished (or failed) output buffers.
#[cfg_attr(test, mockall::automock)]
pub trait FrameConsumer: Send + Sync {
    fn on_frame_ready(
        &self,
        buffer: ProcBuffer,
        settings: Arc<ProcessingSettings>,
        status: FrameStatus,
    ) -> PipelineResult<()>;
}

/// One delivery to the outer consumer.
#[derive(Debug, Clone)]
pub struct FrameReady {
    pub buffer: ProcBuffer,
    pub settings: Arc<ProcessingSettings>,
    pub status: FrameStatus,
}

impl FrameReady {
    pub fn stream(&self) -> Option<StreamId> {
        self.buffer.origin()
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// Consumer that forwards deliveries over a channel.
#[derive(Clone)]
pub struct ChannelConsumer {
    tx: Sender<FrameReady>,
}

impl ChannelConsumer {
    pub fn new() -> (Self, FrameReceiver) {
        let (tx, rx) = unbounded();
        (Self { tx }, FrameReceiver { rx })
    }
}

impl FrameConsumer for ChannelConsumer {
    fn on_frame_ready(
        &self,
        buffer: ProcBuffer,
        settings: Arc<ProcessingSettings>,
        status: FrameStatus,
    ) -> PipelineResult<()> {
        self.tx
            .send(FrameReady {
                buffer,
                settings,
                status,
            })
            .map_err(|_| PipelineError::ProcessingFailed("frame consumer disconnected".into()))
    }
}

/// Consumer-side handle of a [`ChannelConsumer`].
pub struct FrameReceiver {
    rx: Receiver<FrameReady>,
}

impl FrameReceiver {
    /// Everything delivered so far, without blocking.
    pub fn drain(&self) -> Vec<FrameReady> {
        self.rx.try_iter().collect()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<FrameReady> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Wait for `count` deliveries, giving up after `timeout` per delivery.
    pub fn collect(&self, count: usize, timeout: Duration) -> Vec<FrameReady> {
        let mut frames = Vec::with_capacity(count);
        while frames.len() < count {
            match self.recv_timeout(timeout) {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        frames
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Position of a unit between the input and the Output Join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitLevel {
    First,
    Middle,
}

/// Per-unit counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnitStats {
    pub processed: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// Snapshot of a single processing unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub name: String,
    pub kind: TransformKind,
    pub mode: BufferMode,
    pub level: UnitLevel,
    pub is_exit: bool,
    pub enabled: bool,
    pub sync: bool,
    pub running: bool,
    pub stats: UnitStats,
}

/// Snapshot of a single listener link between two units.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeSnapshot {
    pub id: EdgeId,
    pub from: UnitId,
    pub to: UnitId,
}

/// Complete topology snapshot of a built graph.
#[derive(Debug, Clone, Serialize)]
pub struct TopologySnapshot {
    pub units: Vec<UnitSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
    pub exits: Vec<(StreamId, UnitId)>,
    pub direct_streams: Vec<StreamId>,
    pub may_need_sync: bool,
    pub needs_post_process: bool,
    pub pending_sync_items: usize,
}

impl TopologySnapshot {
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn units_of_kind(&self, kind: TransformKind) -> impl Iterator<Item = &UnitSnapshot> {
        self.units.iter().filter(move |u| u.kind == kind)
    }

    pub fn exit_for(&self, stream: StreamId) -> Option<UnitId> {
        self.exits
            .iter()
            .find(|(s, _)| *s == stream)
            .map(|(_, unit)| *unit)
    }
}
