//! Collaborators the processing graph depends on.
//!
//! Each collaborator is a narrow trait so the pipeline can run against real
//! hardware services or the software implementations provided here.
//!
//! # Components
//!
//! - [`BufferAllocator`] / [`HeapAllocator`] - Raw buffer allocation for unit pools
//! - [`CropScaler`] / [`SoftwareScaler`] / [`UnavailableScaler`] - 2D crop/scale/rotate engine
//! - [`JpegEngine`] / [`SoftwareJpegEngine`] - JPEG encoder sessions
//! - [`FrameSource`] / [`TestPatternSource`] - Input frame supply
//!
//! [`Backends`] bundles the collaborators handed to the graph builder.
//!
//! # Example
//!
//! ```ignore
//! use frame_postproc::backend::{Backends, UnavailableScaler};
//! use std::sync::Arc;
//!
//! // Software everywhere, but force the digital zoom fallback path
//! let backends = Backends::software().with_scaler(Arc::new(UnavailableScaler));
//! ```

pub mod accelerator;
pub mod allocator;
pub mod encoder;
pub mod source;

pub use accelerator::{AcceleratorError, CropScaler, SoftwareScaler, UnavailableScaler};
pub use allocator::{AllocError, BufferAllocator, HeapAllocator};
pub use encoder::{EncoderError, JpegEngine, JpegSession, SoftwareJpegEngine};
pub use source::{FrameSource, TestPatternSource};

use crate::pipeline::bridge::FrameConsumer;
use std::sync::Arc;

/// Collaborators shared by every unit of a graph.
#[derive(Clone)]
pub struct Backends {
    pub allocator: Arc<dyn BufferAllocator>,
    pub scaler: Arc<dyn CropScaler>,
    pub jpeg: Arc<dyn JpegEngine>,
    /// Receives frames from pass-through analysis taps
    pub observer: Option<Arc<dyn FrameConsumer>>,
}

impl Backends {
    /// CPU implementations of every collaborator
    pub fn software() -> Self {
        Self {
            allocator: Arc::new(HeapAllocator::new()),
            scaler: Arc::new(SoftwareScaler),
            jpeg: Arc::new(SoftwareJpegEngine::default()),
            observer: None,
        }
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn BufferAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_scaler(mut self, scaler: Arc<dyn CropScaler>) -> Self {
        self.scaler = scaler;
        self
    }

    pub fn with_jpeg(mut self, jpeg: Arc<dyn JpegEngine>) -> Self {
        self.jpeg = jpeg;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn FrameConsumer>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl Default for Backends {
    fn default() -> Self {
        Self::software()
    }
}
