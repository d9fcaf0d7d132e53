//! Graph builder — turns a [`GraphPlan`] into prepared, linked units.
//!
//! Units live in an arena (`Vec<Arc<ProcessingUnit>>`) indexed by [`UnitId`].
//! Listener links only point downstream, and every link is also recorded as
//! an edge so the topology can be inspected without walking the units.
//!
//! Build order:
//! 1. Face-detection tap (first level, fed the input directly)
//! 2. Common chain in priority order
//! 3. Each stream's private chain, headed at the common tail or the input
//!
//! Every unit is prepared as soon as it is created. The first failure aborts
//! the build and drops everything created so far; nothing has been started.

use crate::backend::Backends;
use crate::config::PipelineConfig;
use crate::imaging::lsc::BlockSizing;
use crate::pipeline::bridge::{
    EdgeSnapshot, FrameConsumer, TopologySnapshot, UnitLevel, UnitSnapshot,
};
use crate::pipeline::buffer::BufferMode;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{EdgeId, StreamId, UnitId};
use crate::pipeline::join::OutputJoin;
use crate::pipeline::plan::GraphPlan;
use crate::pipeline::transform::{AnyTransform, BuiltinTransform, TransformKind};
use crate::pipeline::transforms::{
    CopyTransform, DigitalZoomTransform, FaceDetectionTap, JpegTransform, LensShadingTransform,
    ScaleTransform,
};
use crate::pipeline::unit::{Listener, ProcessingUnit};
use crate::types::{FrameDescriptor, OutputStreamDescriptor};
use std::sync::Arc;

/// A built processing graph. Units are not started.
pub struct ProcessingGraph {
    units: Vec<Arc<ProcessingUnit>>,
    levels: Vec<UnitLevel>,
    edges: Vec<EdgeSnapshot>,
    stream_exits: Vec<(StreamId, UnitId)>,
    direct_streams: Vec<StreamId>,
    join: Arc<OutputJoin>,
    plan: GraphPlan,
}

impl ProcessingGraph {
    pub fn units(&self) -> &[Arc<ProcessingUnit>] {
        &self.units
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn unit(&self, id: UnitId) -> Option<&Arc<ProcessingUnit>> {
        if !id.is_valid() {
            return None;
        }
        self.units.get(id.index())
    }

    pub fn level(&self, id: UnitId) -> Option<UnitLevel> {
        self.levels.get(id.index()).copied()
    }

    pub fn edges(&self) -> &[EdgeSnapshot] {
        &self.edges
    }

    pub fn join(&self) -> &Arc<OutputJoin> {
        &self.join
    }

    pub fn plan(&self) -> &GraphPlan {
        &self.plan
    }

    pub fn input_descriptor(&self) -> &FrameDescriptor {
        &self.plan.input
    }

    pub fn needs_post_process(&self) -> bool {
        self.plan.needs_post_process
    }

    /// Units fed directly with the input frame
    pub fn first_level(&self) -> impl Iterator<Item = &Arc<ProcessingUnit>> {
        self.units
            .iter()
            .zip(&self.levels)
            .filter(|(_, level)| **level == UnitLevel::First)
            .map(|(unit, _)| unit)
    }

    /// Exit unit serving `stream`
    pub fn exit_for(&self, stream: StreamId) -> Option<&Arc<ProcessingUnit>> {
        self.stream_exits
            .iter()
            .find(|(s, _)| *s == stream)
            .and_then(|(_, id)| self.unit(*id))
    }

    pub fn stream_exits(&self) -> &[(StreamId, UnitId)] {
        &self.stream_exits
    }

    pub fn is_exit(&self, id: UnitId) -> bool {
        self.stream_exits.iter().any(|(_, exit)| *exit == id)
    }

    pub fn is_direct(&self, stream: StreamId) -> bool {
        self.direct_streams.contains(&stream)
    }

    pub fn direct_streams(&self) -> &[StreamId] {
        &self.direct_streams
    }

    /// Units grouped first level → middle → exits, each unit once.
    pub fn level_order(&self) -> Vec<Arc<ProcessingUnit>> {
        let mut order: Vec<Arc<ProcessingUnit>> = Vec::with_capacity(self.units.len());
        let first = self.first_level().cloned();
        let middle = self
            .units
            .iter()
            .zip(&self.levels)
            .filter(|(unit, level)| **level == UnitLevel::Middle && !self.is_exit(unit.id()))
            .map(|(unit, _)| Arc::clone(unit));
        let exits = self
            .units
            .iter()
            .filter(|unit| self.is_exit(unit.id()))
            .cloned();
        for unit in first.chain(middle).chain(exits) {
            if !order.iter().any(|u| u.id() == unit.id()) {
                order.push(unit);
            }
        }
        order
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        let units = self
            .units
            .iter()
            .zip(&self.levels)
            .map(|(unit, level)| UnitSnapshot {
                id: unit.id(),
                name: unit.name().to_string(),
                kind: unit.kind(),
                mode: unit.mode(),
                level: *level,
                is_exit: self.is_exit(unit.id()),
                enabled: unit.is_enabled(),
                sync: unit.is_sync(),
                running: unit.is_running(),
                stats: unit.stats(),
            })
            .collect();

        TopologySnapshot {
            units,
            edges: self.edges.clone(),
            exits: self.stream_exits.clone(),
            direct_streams: self.direct_streams.clone(),
            may_need_sync: self.plan.may_need_sync,
            needs_post_process: self.plan.needs_post_process,
            pending_sync_items: self.join.pending_items(),
        }
    }
}

/// Builds a [`ProcessingGraph`] for one configuration.
pub struct GraphBuilder<'a> {
    config: &'a PipelineConfig,
    backends: &'a Backends,
    units: Vec<Arc<ProcessingUnit>>,
    levels: Vec<UnitLevel>,
    edges: Vec<EdgeSnapshot>,
    outputs: Vec<FrameDescriptor>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a PipelineConfig, backends: &'a Backends) -> Self {
        Self {
            config,
            backends,
            units: Vec::new(),
            levels: Vec::new(),
            edges: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn build(
        mut self,
        input: &FrameDescriptor,
        streams: &[OutputStreamDescriptor],
        consumer: Arc<dyn FrameConsumer>,
    ) -> PipelineResult<ProcessingGraph> {
        let plan = GraphPlan::compute(input, streams, &self.config.platform)?;
        let join = Arc::new(OutputJoin::new(consumer, plan.may_need_sync));
        let mut stream_exits = Vec::new();

        if plan.has_face_detection() {
            let observer = self.backends.observer.clone().ok_or_else(|| {
                PipelineError::InvalidConfiguration(
                    "face detection enabled without a frame observer".into(),
                )
            })?;
            let tap = self.add_unit(
                TransformKind::FaceDetection,
                BufferMode::Aliased,
                None,
                input,
                *input,
                &plan,
            )?;
            self.units[tap.index()].attach_listener(Listener::Observer(observer));
        }

        // Common chain
        let mut common_tail: Option<UnitId> = None;
        let chain = plan.common_chain();
        for kind in &chain {
            let is_exit = plan.last_level_common == Some(*kind) && chain.last() == Some(kind);
            let (mode, output) = if is_exit {
                (BufferMode::Caller, plan.streams[0].stream.frame_descriptor())
            } else {
                (
                    BufferMode::Pool,
                    FrameDescriptor::semi_planar(input.width, input.height, input.format),
                )
            };
            let upstream_desc = self.output_of(common_tail, input);
            let id = self.add_unit(*kind, mode, common_tail, &upstream_desc, output, &plan)?;
            if is_exit {
                self.units[id.index()].attach_listener(Listener::Join(Arc::clone(&join)));
                stream_exits.push((plan.streams[0].id(), id));
            }
            common_tail = Some(id);
        }

        // Stream chains
        for stream_plan in &plan.streams {
            if stream_plan.direct || stream_plan.mask.is_empty() {
                continue;
            }
            let stream = &stream_plan.stream;
            let kinds: Vec<TransformKind> =
                stream_plan.mask.iter_in(&TransformKind::STREAM_ORDER).collect();
            let mut prev = common_tail;
            for (i, kind) in kinds.iter().enumerate() {
                let last = i + 1 == kinds.len();
                let output = match kind {
                    TransformKind::ScaleRotate if !last => FrameDescriptor::nv12(stream.width, stream.height),
                    _ => stream.frame_descriptor(),
                };
                let mode = if last {
                    BufferMode::Caller
                } else {
                    BufferMode::Pool
                };
                let upstream_desc = self.output_of(prev, input);
                let id = self.add_unit(*kind, mode, prev, &upstream_desc, output, &plan)?;
                prev = Some(id);
            }
            if let Some(exit) = prev.filter(|id| Some(*id) != common_tail) {
                self.units[exit.index()].attach_listener(Listener::Join(Arc::clone(&join)));
                stream_exits.push((stream.id, exit));
            }
        }

        if let Some(orphan) = self.units.iter().find(|u| u.listener_count() == 0) {
            return Err(PipelineError::InvalidConfiguration(format!(
                "unit {} ({}) has no listener",
                orphan.id(),
                orphan.name()
            )));
        }

        let direct_streams: Vec<StreamId> = plan.direct_streams().map(|p| p.id()).collect();
        tracing::info!(
            "Built processing graph: {} units, {} edges, {} exits, {} direct streams",
            self.units.len(),
            self.edges.len(),
            stream_exits.len(),
            direct_streams.len()
        );

        Ok(ProcessingGraph {
            units: self.units,
            levels: self.levels,
            edges: self.edges,
            stream_exits,
            direct_streams,
            join,
            plan,
        })
    }

    fn output_of(&self, unit: Option<UnitId>, input: &FrameDescriptor) -> FrameDescriptor {
        unit.and_then(|id| self.outputs.get(id.index()).copied())
            .unwrap_or(*input)
    }

    fn make_transform(&self, kind: TransformKind, plan: &GraphPlan) -> PipelineResult<AnyTransform> {
        let scaler = Arc::clone(&self.backends.scaler);
        let builtin = match kind {
            TransformKind::DigitalZoom => BuiltinTransform::DigitalZoom(DigitalZoomTransform::new(
                scaler,
                self.config.platform.active_pixel_array,
            )),
            TransformKind::CropRotateScale => {
                BuiltinTransform::Scale(ScaleTransform::crop_rotate_scale(scaler, plan.rotation))
            }
            TransformKind::LensShading => {
                BuiltinTransform::LensShading(LensShadingTransform::new(self.lsc_sizing()))
            }
            TransformKind::FaceDetection => BuiltinTransform::FaceDetection(FaceDetectionTap::new()),
            TransformKind::ScaleRotate => BuiltinTransform::Scale(ScaleTransform::scale_rotate(scaler)),
            TransformKind::JpegEncode => {
                BuiltinTransform::Jpeg(JpegTransform::new(Arc::clone(&self.backends.jpeg)))
            }
            TransformKind::Copy => BuiltinTransform::Copy(CopyTransform::new()),
            TransformKind::Custom => {
                return Err(PipelineError::InvalidConfiguration(
                    "plugin stages cannot be planned into a graph".into(),
                ))
            }
        };
        Ok(builtin.into())
    }

    fn lsc_sizing(&self) -> BlockSizing {
        self.config.lsc_sizing
    }

    /// Create, prepare and link one unit.
    fn add_unit(
        &mut self,
        kind: TransformKind,
        mode: BufferMode,
        upstream: Option<UnitId>,
        input: &FrameDescriptor,
        output: FrameDescriptor,
        plan: &GraphPlan,
    ) -> PipelineResult<UnitId> {
        let id = UnitId(self.units.len() as u32);
        let unit = Arc::new(ProcessingUnit::new(
            id,
            kind.unit_name(),
            mode,
            self.make_transform(kind, plan)?,
        ));

        if let Err(e) = unit.prepare(
            input,
            &output,
            self.config.pool_depth,
            self.backends.allocator.as_ref(),
        ) {
            tracing::error!("Failed to prepare {} unit: {}", kind, e);
            return Err(e);
        }

        let level = match upstream {
            Some(from) => {
                self.units[from.index()].attach_listener(Listener::Unit(Arc::clone(&unit)));
                self.edges.push(EdgeSnapshot {
                    id: EdgeId(self.edges.len() as u32),
                    from,
                    to: id,
                });
                UnitLevel::Middle
            }
            None => UnitLevel::First,
        };

        self.units.push(unit);
        self.levels.push(level);
        self.outputs.push(output);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::encoder::MockJpegEngine;
    use crate::backend::EncoderError;
    use crate::config::PlatformCapabilities;
    use crate::pipeline::bridge::ChannelConsumer;
    use crate::types::{PixelFormat, Rotation};

    fn consumer() -> Arc<dyn FrameConsumer> {
        Arc::new(ChannelConsumer::new().0)
    }

    fn stream(id: u64, w: u32, h: u32, format: PixelFormat) -> OutputStreamDescriptor {
        OutputStreamDescriptor::new(StreamId(id), w, h, format)
    }

    fn build(
        config: &PipelineConfig,
        backends: &Backends,
        streams: &[OutputStreamDescriptor],
    ) -> PipelineResult<ProcessingGraph> {
        GraphBuilder::new(config, backends).build(&FrameDescriptor::nv12(64, 48), streams, consumer())
    }

    #[test]
    fn test_direct_route_has_no_units() {
        let graph = build(
            &PipelineConfig::default(),
            &Backends::software(),
            &[stream(1, 64, 48, PixelFormat::Nv12)],
        )
        .unwrap();
        assert_eq!(graph.unit_count(), 0);
        assert!(graph.is_direct(StreamId(1)));
    }

    #[test]
    fn test_plugin_kind_is_not_buildable() {
        let config = PipelineConfig::default();
        let backends = Backends::software();
        let input = FrameDescriptor::nv12(64, 48);
        let plan = GraphPlan::compute(&input, &[stream(1, 32, 24, PixelFormat::Nv12)], &config.platform)
            .unwrap();
        let builder = GraphBuilder::new(&config, &backends);
        assert!(matches!(
            builder.make_transform(TransformKind::Custom, &plan),
            Err(PipelineError::InvalidConfiguration(_))
        ));
        assert!(builder.make_transform(TransformKind::Copy, &plan).is_ok());
    }

    #[test]
    fn test_two_streams_copy_and_scale() {
        let graph = build(
            &PipelineConfig::default(),
            &Backends::software(),
            &[stream(1, 64, 48, PixelFormat::Nv12), stream(2, 32, 24, PixelFormat::Nv12)],
        )
        .unwrap();
        assert_eq!(graph.unit_count(), 2);
        let copy = graph.exit_for(StreamId(1)).unwrap();
        let scale = graph.exit_for(StreamId(2)).unwrap();
        assert_eq!(copy.kind(), TransformKind::Copy);
        assert_eq!(scale.kind(), TransformKind::ScaleRotate);
        assert_eq!(copy.mode(), BufferMode::Caller);
        assert_eq!(scale.mode(), BufferMode::Caller);
        assert!(graph.edges().is_empty());
        assert_eq!(graph.first_level().count(), 2);
    }

    #[test]
    fn test_scaled_jpeg_chain() {
        let graph = build(
            &PipelineConfig::default(),
            &Backends::software(),
            &[stream(1, 32, 24, PixelFormat::Blob)],
        )
        .unwrap();
        assert_eq!(graph.unit_count(), 2);
        let scale = graph.unit(UnitId(0)).unwrap();
        let jpeg = graph.unit(UnitId(1)).unwrap();
        assert_eq!(scale.kind(), TransformKind::ScaleRotate);
        assert_eq!(scale.mode(), BufferMode::Pool);
        assert_eq!(scale.output_descriptor(), Some(FrameDescriptor::nv12(32, 24)));
        assert_eq!(jpeg.kind(), TransformKind::JpegEncode);
        assert_eq!(jpeg.mode(), BufferMode::Caller);
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.level(UnitId(1)), Some(UnitLevel::Middle));
    }

    #[test]
    fn test_jpeg_session_failure_fails_build() {
        let mut engine = MockJpegEngine::new();
        engine
            .expect_create_session()
            .returning(|| Err(EncoderError::Session("no encoder".into())));
        let backends = Backends::software().with_jpeg(Arc::new(engine));
        let result = build(
            &PipelineConfig::default(),
            &backends,
            &[stream(1, 64, 48, PixelFormat::Blob)],
        );
        assert!(matches!(result, Err(PipelineError::Encode(_))));
    }

    #[test]
    fn test_single_common_stage_is_exit() {
        let mut config = PipelineConfig::default();
        config.platform.software_lsc = true;
        let graph = build(&config, &Backends::software(), &[stream(1, 64, 48, PixelFormat::Nv12)])
            .unwrap();
        assert_eq!(graph.unit_count(), 1);
        let lsc = graph.exit_for(StreamId(1)).unwrap();
        assert_eq!(lsc.kind(), TransformKind::LensShading);
        assert_eq!(lsc.mode(), BufferMode::Caller);
        assert!(!graph.is_direct(StreamId(1)));
    }

    #[test]
    fn test_common_chain_feeds_streams() {
        let mut config = PipelineConfig::default();
        config.platform = PlatformCapabilities {
            max_digital_zoom: 4.0,
            software_lsc: true,
            ..Default::default()
        };
        let graph = build(
            &config,
            &Backends::software(),
            &[
                stream(1, 64, 48, PixelFormat::Nv12).with_rotation(Rotation::Deg180),
                stream(2, 32, 24, PixelFormat::Nv12),
            ],
        )
        .unwrap();
        let kinds: Vec<_> = graph.units().iter().map(|u| u.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                TransformKind::DigitalZoom,
                TransformKind::CropRotateScale,
                TransformKind::LensShading,
                TransformKind::Copy,
                TransformKind::ScaleRotate,
            ]
        );
        // LSC fans out to both stream chains
        assert_eq!(graph.unit(UnitId(2)).unwrap().downstream_units(), vec![UnitId(3), UnitId(4)]);
        assert!(graph.units()[..3].iter().all(|u| u.mode() == BufferMode::Pool));
        assert_eq!(graph.first_level().count(), 1);
    }

    #[test]
    fn test_face_detection_requires_observer() {
        let mut config = PipelineConfig::default();
        config.platform.face_detection = true;
        let result = build(&config, &Backends::software(), &[stream(1, 64, 48, PixelFormat::Nv12)]);
        assert!(matches!(result, Err(PipelineError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_face_detection_tap_is_first_level() {
        let mut config = PipelineConfig::default();
        config.platform.face_detection = true;
        let backends = Backends::software().with_observer(consumer());
        let graph = build(&config, &backends, &[stream(1, 32, 24, PixelFormat::Nv12)]).unwrap();
        let tap = graph.unit(UnitId(0)).unwrap();
        assert_eq!(tap.kind(), TransformKind::FaceDetection);
        assert_eq!(tap.mode(), BufferMode::Aliased);
        assert!(!graph.is_exit(tap.id()));
        assert_eq!(graph.first_level().count(), 2);
    }

    #[test]
    fn test_level_order_visits_exits_last() {
        let graph = build(
            &PipelineConfig::default(),
            &Backends::software(),
            &[stream(1, 32, 24, PixelFormat::Blob), stream(2, 64, 48, PixelFormat::Nv12)],
        )
        .unwrap();
        let order: Vec<_> = graph.level_order().iter().map(|u| u.kind()).collect();
        assert_eq!(
            order,
            vec![TransformKind::ScaleRotate, TransformKind::Copy, TransformKind::JpegEncode]
        );
    }
}
