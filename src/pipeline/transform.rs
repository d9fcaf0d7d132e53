//! Transform abstraction for processing units.
//!
//! Two-layer design:
//! - **`TransformPlugin` trait** — for custom stages supplied by the embedder.
//! - **`BuiltinTransform` enum** — for every stage the graph builder creates.
//!   The variant is chosen once at build time and dispatched by `match`.
//!
//! `AnyTransform` wraps either variant so a unit can handle both uniformly.

use crate::pipeline::buffer::ProcBuffer;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::settings::ProcessingSettings;
use crate::pipeline::transforms::{
    CopyTransform, DigitalZoomTransform, FaceDetectionTap, JpegTransform, LensShadingTransform,
    ScaleTransform,
};
use crate::types::FrameDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// What a unit does to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    DigitalZoom,
    CropRotateScale,
    LensShading,
    FaceDetection,
    ScaleRotate,
    JpegEncode,
    Copy,
    /// Plugin stage, never produced by the graph builder
    Custom,
}

impl TransformKind {
    /// Common stages in build order
    pub const COMMON_ORDER: [TransformKind; 4] = [
        TransformKind::DigitalZoom,
        TransformKind::CropRotateScale,
        TransformKind::LensShading,
        TransformKind::FaceDetection,
    ];

    /// Stream-specific stages in build order
    pub const STREAM_ORDER: [TransformKind; 3] = [
        TransformKind::ScaleRotate,
        TransformKind::JpegEncode,
        TransformKind::Copy,
    ];

    pub fn bit(self) -> u32 {
        match self {
            TransformKind::DigitalZoom => 1 << 0,
            TransformKind::CropRotateScale => 1 << 1,
            TransformKind::LensShading => 1 << 2,
            TransformKind::FaceDetection => 1 << 3,
            TransformKind::ScaleRotate => 1 << 8,
            TransformKind::JpegEncode => 1 << 9,
            TransformKind::Copy => 1 << 10,
            TransformKind::Custom => 0,
        }
    }

    /// Unit name used in logs and snapshots
    pub fn unit_name(self) -> &'static str {
        match self {
            TransformKind::DigitalZoom => "digitalZoom",
            TransformKind::CropRotateScale => "cropRotateScale",
            TransformKind::LensShading => "swLsc",
            TransformKind::FaceDetection => "faceDetection",
            TransformKind::ScaleRotate => "scaleRotate",
            TransformKind::JpegEncode => "jpegEncoder",
            TransformKind::Copy => "copy",
            TransformKind::Custom => "custom",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.unit_name())
    }
}

/// Set of transforms needed by a path through the graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransformMask(u32);

impl TransformMask {
    pub const EMPTY: TransformMask = TransformMask(0);

    /// Stages that never need a buffer of their own
    pub fn no_internal_buffer() -> Self {
        TransformMask::of(TransformKind::Copy) | TransformKind::FaceDetection
    }

    pub fn of(kind: TransformKind) -> Self {
        TransformMask(kind.bit())
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, kind: TransformKind) -> bool {
        let bit = kind.bit();
        bit != 0 && self.0 & bit == bit
    }

    pub fn insert(&mut self, kind: TransformKind) {
        self.0 |= kind.bit();
    }

    pub fn without(self, other: TransformMask) -> Self {
        TransformMask(self.0 & !other.0)
    }

    /// Members of `order` present in this mask, in that order
    pub fn iter_in(self, order: &[TransformKind]) -> impl Iterator<Item = TransformKind> + '_ {
        order.iter().copied().filter(move |k| self.contains(*k))
    }

    /// Last member of `order` present in this mask
    pub fn last_in(self, order: &[TransformKind]) -> Option<TransformKind> {
        order.iter().rev().copied().find(|k| self.contains(*k))
    }
}

impl BitOr for TransformMask {
    type Output = TransformMask;
    fn bitor(self, rhs: TransformMask) -> TransformMask {
        TransformMask(self.0 | rhs.0)
    }
}

impl BitOr<TransformKind> for TransformMask {
    type Output = TransformMask;
    fn bitor(self, rhs: TransformKind) -> TransformMask {
        TransformMask(self.0 | rhs.bit())
    }
}

impl BitOrAssign for TransformMask {
    fn bitor_assign(&mut self, rhs: TransformMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TransformMask {
    type Output = TransformMask;
    fn bitand(self, rhs: TransformMask) -> TransformMask {
        TransformMask(self.0 & rhs.0)
    }
}

impl fmt::Debug for TransformMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self
            .iter_in(&TransformKind::COMMON_ORDER)
            .chain(self.iter_in(&TransformKind::STREAM_ORDER))
            .map(TransformKind::unit_name)
            .collect();
        write!(f, "TransformMask({:#x} {:?})", self.0, names)
    }
}

/// Result of running a transform on one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The output buffer holds a finished frame
    Produced,
    /// Input consumed, output not ready yet; keep the output for the next input
    NeedMoreInput,
}

/// Trait for embedder-supplied stages.
pub trait TransformPlugin: Send {
    /// Human-readable name of this stage.
    fn name(&self) -> &str;

    /// Allocate stage resources for the given geometry.
    fn prepare(&mut self, _input: &FrameDescriptor, _output: &FrameDescriptor) -> PipelineResult<()> {
        Ok(())
    }

    /// Whether this stage can convert `input` into `output`.
    fn check_format(&self, _input: &FrameDescriptor, _output: &FrameDescriptor) -> bool {
        true
    }

    /// Process one input into `output`.
    fn process(
        &mut self,
        input: &ProcBuffer,
        output: &ProcBuffer,
        settings: &ProcessingSettings,
    ) -> PipelineResult<TransformOutcome>;
}

/// Enum dispatch for the stages the graph builder creates.
pub enum BuiltinTransform {
    Copy(CopyTransform),
    Scale(ScaleTransform),
    DigitalZoom(DigitalZoomTransform),
    LensShading(LensShadingTransform),
    Jpeg(JpegTransform),
    FaceDetection(FaceDetectionTap),
}

impl BuiltinTransform {
    pub fn kind(&self) -> TransformKind {
        match self {
            BuiltinTransform::Copy(_) => TransformKind::Copy,
            BuiltinTransform::Scale(t) => t.kind(),
            BuiltinTransform::DigitalZoom(_) => TransformKind::DigitalZoom,
            BuiltinTransform::LensShading(_) => TransformKind::LensShading,
            BuiltinTransform::Jpeg(_) => TransformKind::JpegEncode,
            BuiltinTransform::FaceDetection(_) => TransformKind::FaceDetection,
        }
    }

    pub fn prepare(&mut self, input: &FrameDescriptor, output: &FrameDescriptor) -> PipelineResult<()> {
        match self {
            BuiltinTransform::Copy(_) => Ok(()),
            BuiltinTransform::Scale(_) => Ok(()),
            BuiltinTransform::DigitalZoom(_) => Ok(()),
            BuiltinTransform::LensShading(t) => t.prepare(input, output),
            BuiltinTransform::Jpeg(t) => t.prepare(),
            BuiltinTransform::FaceDetection(_) => Ok(()),
        }
    }

    pub fn check_format(&self, input: &FrameDescriptor, output: &FrameDescriptor) -> bool {
        match self {
            BuiltinTransform::Copy(_) => true,
            BuiltinTransform::Scale(_) => ScaleTransform::check_format(input, output),
            BuiltinTransform::DigitalZoom(_) => DigitalZoomTransform::check_format(input, output),
            BuiltinTransform::LensShading(_) => LensShadingTransform::check_format(input, output),
            BuiltinTransform::Jpeg(_) => JpegTransform::check_format(input, output),
            BuiltinTransform::FaceDetection(_) => true,
        }
    }

    pub fn process(
        &mut self,
        input: &ProcBuffer,
        output: &ProcBuffer,
        settings: &ProcessingSettings,
    ) -> PipelineResult<TransformOutcome> {
        match self {
            BuiltinTransform::Copy(t) => t.process(input, output),
            BuiltinTransform::Scale(t) => t.process(input, output),
            BuiltinTransform::DigitalZoom(t) => t.process(input, output, settings),
            BuiltinTransform::LensShading(t) => t.process(input, output),
            BuiltinTransform::Jpeg(t) => t.process(input, output, settings),
            BuiltinTransform::FaceDetection(t) => t.process(input, output),
        }
    }
}

/// Wrapper that holds either a built-in stage (enum dispatch) or a plugin (trait object).
pub enum AnyTransform {
    Builtin(BuiltinTransform),
    Plugin(Box<dyn TransformPlugin>),
}

impl AnyTransform {
    pub fn kind(&self) -> TransformKind {
        match self {
            AnyTransform::Builtin(t) => t.kind(),
            AnyTransform::Plugin(_) => TransformKind::Custom,
        }
    }

    pub fn prepare(&mut self, input: &FrameDescriptor, output: &FrameDescriptor) -> PipelineResult<()> {
        match self {
            AnyTransform::Builtin(t) => t.prepare(input, output),
            AnyTransform::Plugin(t) => t.prepare(input, output),
        }
    }

    pub fn check_format(&self, input: &FrameDescriptor, output: &FrameDescriptor) -> bool {
        match self {
            AnyTransform::Builtin(t) => t.check_format(input, output),
            AnyTransform::Plugin(t) => t.check_format(input, output),
        }
    }

    pub fn process(
        &mut self,
        input: &ProcBuffer,
        output: &ProcBuffer,
        settings: &ProcessingSettings,
    ) -> PipelineResult<TransformOutcome> {
        match self {
            AnyTransform::Builtin(t) => t.process(input, output, settings),
            AnyTransform::Plugin(t) => t.process(input, output, settings),
        }
    }
}

impl From<BuiltinTransform> for AnyTransform {
    fn from(t: BuiltinTransform) -> Self {
        AnyTransform::Builtin(t)
    }
}

impl From<Box<dyn TransformPlugin>> for AnyTransform {
    fn from(t: Box<dyn TransformPlugin>) -> Self {
        AnyTransform::Plugin(t)
    }
}
