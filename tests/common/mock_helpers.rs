//! Hand-written collaborators for driving the pipeline from outside the crate

use frame_postproc::backend::{
    AcceleratorError, CropScaler, EncoderError, JpegEngine, JpegSession, SoftwareScaler,
};
use frame_postproc::pipeline::{
    FrameBuffer, FrameConsumer, FrameReady, FrameStatus, PipelineResult, ProcBuffer,
    ProcessingSettings, StreamId,
};
use frame_postproc::types::{Rect, Rotation};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Consumer that keeps every delivery in memory, in arrival order.
#[derive(Default)]
pub struct RecordingConsumer {
    frames: Mutex<Vec<FrameReady>>,
}

impl RecordingConsumer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn frames(&self) -> Vec<FrameReady> {
        self.frames.lock().unwrap().clone()
    }

    pub fn count_for(&self, stream: StreamId) -> usize {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.stream() == Some(stream))
            .count()
    }
}

impl FrameConsumer for RecordingConsumer {
    fn on_frame_ready(
        &self,
        buffer: ProcBuffer,
        settings: Arc<ProcessingSettings>,
        status: FrameStatus,
    ) -> PipelineResult<()> {
        self.frames.lock().unwrap().push(FrameReady {
            buffer,
            settings,
            status,
        });
        Ok(())
    }
}

/// Software scaler that counts how often it is asked to work.
#[derive(Default)]
pub struct CountingScaler {
    calls: AtomicUsize,
}

impl CountingScaler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CropScaler for CountingScaler {
    fn crop_scale(
        &self,
        src: &FrameBuffer,
        crop: Rect,
        dst: &FrameBuffer,
        rotation: Rotation,
    ) -> Result<(), AcceleratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SoftwareScaler.crop_scale(src, crop, dst, rotation)
    }
}

/// JPEG engine whose sessions open fine but fail every encode.
pub struct FailingJpegEngine;

struct FailingSession;

impl JpegEngine for FailingJpegEngine {
    fn create_session(&self) -> Result<Box<dyn JpegSession>, EncoderError> {
        Ok(Box::new(FailingSession))
    }
}

impl JpegSession for FailingSession {
    fn encode(
        &mut self,
        _input: &FrameBuffer,
        _output: &FrameBuffer,
        _settings: &ProcessingSettings,
    ) -> Result<usize, EncoderError> {
        Err(EncoderError::Encode("hardware encoder fault".into()))
    }
}

/// JPEG engine that cannot open a session.
pub struct UnavailableJpegEngine;

impl JpegEngine for UnavailableJpegEngine {
    fn create_session(&self) -> Result<Box<dyn JpegSession>, EncoderError> {
        Err(EncoderError::Session("no encoder instance".into()))
    }
}
