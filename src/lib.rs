//! # frame-postproc: camera frame post-processing pipeline
//!
//! Given one input frame and a set of requested output streams (different
//! sizes, formats, rotations, JPEG compression), builds a graph of processing
//! units that produces one buffer per stream at frame rate.
//!
//! ## Architecture
//!
//! - **Pipeline**: processing-unit graph, per-unit workers, buffer pools, Output Join
//! - **Backend**: collaborator contracts (allocator, 2D accelerator, JPEG engine,
//!   frame source) with software implementations
//! - **Imaging**: raw pixel kernels (NV12 crop/scale/rotate, lens shading gains)
//! - **Communication**: crossbeam channels between units and to the consumer
//!
//! ## Configuration
//!
//! Platform capabilities and pool sizing are read from a TOML (or JSON) file,
//! by default `pipeline.toml` in the platform config directory under
//! `frame-postproc`.
//!
//! ## Example
//!
//! ```ignore
//! use frame_postproc::{
//!     backend::Backends,
//!     config::PipelineConfig,
//!     pipeline::{ChannelConsumer, Pipeline, ProcBuffer, ProcessingSettings, StreamId},
//!     types::{FrameDescriptor, OutputStreamDescriptor, PixelFormat},
//! };
//! use std::sync::Arc;
//!
//! let (consumer, frames) = ChannelConsumer::new();
//! let mut pipeline = Pipeline::new(PipelineConfig::default(), Backends::software(), Arc::new(consumer));
//!
//! let input = FrameDescriptor::nv12(1920, 1080);
//! let preview = OutputStreamDescriptor::new(StreamId(1), 640, 480, PixelFormat::Nv12);
//! pipeline.configure(&input, &[preview])?;
//! pipeline.start()?;
//!
//! pipeline.process_frame(input_buffer, vec![preview_buffer], ProcessingSettings::for_request(1).shared())?;
//! let ready = frames.recv_timeout(std::time::Duration::from_millis(100));
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod imaging;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use backend::Backends;
pub use config::{PipelineConfig, PlatformCapabilities};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineError, ProcBuffer, ProcessingSettings};
pub use types::{FrameDescriptor, OutputStreamDescriptor, PixelFormat, Rect, Rotation};
