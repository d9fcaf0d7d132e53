//! Transform planning — decides which stages a configuration needs.
//!
//! The plan is pure data computed from the input descriptor, the requested
//! streams and the platform capabilities. [`crate::pipeline::builder`] turns
//! it into units.

use crate::config::PlatformCapabilities;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::StreamId;
use crate::pipeline::transform::{TransformKind, TransformMask};
use crate::types::{FrameDescriptor, OutputStreamDescriptor, Rotation};

/// Stages needed by one output stream.
#[derive(Debug, Clone)]
pub struct StreamPlan {
    pub stream: OutputStreamDescriptor,
    pub mask: TransformMask,
    /// No unit serves this stream; the input buffer is its output
    pub direct: bool,
}

impl StreamPlan {
    pub fn id(&self) -> StreamId {
        self.stream.id
    }
}

/// Which stages a configuration needs.
#[derive(Debug, Clone)]
pub struct GraphPlan {
    pub input: FrameDescriptor,
    /// Stages run once and shared by every stream
    pub common: TransformMask,
    pub streams: Vec<StreamPlan>,
    /// Rotation applied by the common crop-rotate-scale stage
    pub rotation: Rotation,
    /// Whether the primary stream cannot use the input buffer untouched
    pub needs_post_process: bool,
    /// Whether outputs of one frame can share a physical buffer
    pub may_need_sync: bool,
    /// Common stage that doubles as the exit, when no stream stage follows
    pub last_level_common: Option<TransformKind>,
}

impl GraphPlan {
    pub fn compute(
        input: &FrameDescriptor,
        streams: &[OutputStreamDescriptor],
        caps: &PlatformCapabilities,
    ) -> PipelineResult<Self> {
        if streams.is_empty() {
            return Err(PipelineError::InvalidConfiguration(
                "at least one output stream is required".into(),
            ));
        }
        for (i, s) in streams.iter().enumerate() {
            if streams[..i].iter().any(|other| other.id == s.id) {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "duplicate stream id {}",
                    s.id
                )));
            }
        }

        let mut plans: Vec<StreamPlan> = streams
            .iter()
            .map(|stream| StreamPlan {
                stream: *stream,
                mask: stream_mask(input, stream),
                direct: false,
            })
            .collect();

        let rotation = streams
            .iter()
            .map(|s| s.rotation)
            .find(|r| *r != Rotation::None)
            .unwrap_or_default();

        let mut common = TransformMask::EMPTY;
        if caps.max_digital_zoom > 1.0 {
            common.insert(TransformKind::DigitalZoom);
        }
        if rotation != Rotation::None {
            common.insert(TransformKind::CropRotateScale);
        }
        if caps.software_lsc {
            common.insert(TransformKind::LensShading);
        }
        if caps.face_detection {
            common.insert(TransformKind::FaceDetection);
        }

        let no_internal = TransformMask::no_internal_buffer();
        let common_buffered = common.without(no_internal);
        let needs_post_process =
            !common_buffered.is_empty() || !plans[0].mask.without(no_internal).is_empty();

        if plans.len() > 1 {
            // every stream gets a buffer identity of its own
            for plan in plans.iter_mut().filter(|p| p.mask.is_empty()) {
                plan.mask.insert(TransformKind::Copy);
            }
        } else if plans[0].mask.is_empty() && common_buffered.is_empty() {
            plans[0].direct = true;
        }

        let last_level_common = if plans.iter().all(|p| p.mask.is_empty()) {
            common_buffered.last_in(&TransformKind::COMMON_ORDER)
        } else {
            None
        };

        tracing::debug!(
            "Planned graph: common {:?}, streams {:?}, post-process {}",
            common,
            plans.iter().map(|p| (p.stream.id, p.mask)).collect::<Vec<_>>(),
            needs_post_process
        );

        Ok(Self {
            input: *input,
            common,
            streams: plans,
            rotation,
            needs_post_process,
            may_need_sync: streams.len() > 1,
            last_level_common,
        })
    }

    /// Common stages that run on the main chain, in priority order
    pub fn common_chain(&self) -> Vec<TransformKind> {
        self.common
            .iter_in(&TransformKind::COMMON_ORDER)
            .filter(|k| *k != TransformKind::FaceDetection)
            .collect()
    }

    pub fn has_face_detection(&self) -> bool {
        self.common.contains(TransformKind::FaceDetection)
    }

    pub fn direct_streams(&self) -> impl Iterator<Item = &StreamPlan> {
        self.streams.iter().filter(|p| p.direct)
    }
}

/// Stream-specific stages for one output
pub fn stream_mask(input: &FrameDescriptor, stream: &OutputStreamDescriptor) -> TransformMask {
    let mut mask = TransformMask::EMPTY;
    if stream.width != input.width || stream.height != input.height {
        mask.insert(TransformKind::ScaleRotate);
    }
    if stream.needs_encode() {
        mask.insert(TransformKind::JpegEncode);
    }
    mask
}
