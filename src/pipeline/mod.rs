//! Processing-unit graph and its runtime.
//!
//! Frames flow from the input through units, each running one transform on
//! its own worker thread, into the Output Join which hands them to the outer
//! consumer.
//!
//! # Architecture
//!
//! ```text
//!            ┌──► [faceDetection] ──► observer
//! input ─────┤
//!            └──► [digitalZoom] ──► [swLsc] ─┬──► [copy] ─────────────────┐
//!                                            └──► [scaleRotate] ──► [jpegEncoder] ──► OutputJoin ──► consumer
//! ```
//!
//! # Design
//!
//! - **Enum dispatch on hot path** — `BuiltinTransform` enum for all built-in stages.
//! - **Arena of units** — `UnitId` indexes the graph's unit table; links only point downstream.
//! - **Worker per unit** — each unit drains a crossbeam FIFO on its own thread.
//! - **Ownership-typed buffers** — pool slots return to their pool when the last handle drops.
//! - **Atomic countdown** — sync items release shared buffers exactly once.

pub mod bridge;
pub mod buffer;
pub mod builder;
pub mod error;
pub mod id;
pub mod join;
pub mod plan;
pub mod pool;
pub mod runtime;
pub mod settings;
pub mod transform;
pub mod transforms;
pub mod unit;

pub use bridge::{
    ChannelConsumer, EdgeSnapshot, FrameConsumer, FrameReady, FrameReceiver, TopologySnapshot,
    UnitLevel, UnitSnapshot, UnitStats,
};
pub use buffer::{BufferMode, FrameBuffer, ProcBuffer};
pub use builder::{GraphBuilder, ProcessingGraph};
pub use error::{FrameStatus, PipelineError, PipelineResult};
pub use id::{BufferId, EdgeId, StreamId, UnitId};
pub use join::OutputJoin;
pub use plan::{GraphPlan, StreamPlan};
pub use pool::BufferPool;
pub use runtime::Pipeline;
pub use settings::ProcessingSettings;
pub use transform::{
    AnyTransform, BuiltinTransform, TransformKind, TransformMask, TransformOutcome, TransformPlugin,
};
pub use unit::{Listener, ProcessingUnit};
