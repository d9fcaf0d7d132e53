//! Test data builders for frames, streams and pipelines

use frame_postproc::backend::Backends;
use frame_postproc::config::PipelineConfig;
use frame_postproc::pipeline::{
    ChannelConsumer, FrameBuffer, FrameReceiver, Pipeline, ProcBuffer, StreamId,
};
use frame_postproc::types::{FrameDescriptor, OutputStreamDescriptor, PixelFormat};
use std::sync::Arc;

pub fn stream(id: u64, width: u32, height: u32, format: PixelFormat) -> OutputStreamDescriptor {
    OutputStreamDescriptor::new(StreamId(id), width, height, format)
}

/// Input frame with a deterministic gradient keyed by `seed`
pub fn input_frame(desc: FrameDescriptor, seed: u8) -> ProcBuffer {
    let bytes = (0..desc.size)
        .map(|i| (i as u8).wrapping_mul(3).wrapping_add(seed))
        .collect();
    ProcBuffer::wrap(Arc::new(FrameBuffer::from_bytes(desc, bytes)))
}

/// Caller-owned output for `stream`. Compressed streams get generous headroom.
pub fn caller_buffer(stream: &OutputStreamDescriptor) -> ProcBuffer {
    let mut desc = stream.frame_descriptor();
    if stream.format == PixelFormat::Blob {
        desc = desc.with_size(desc.size.max(64 * 1024));
    }
    ProcBuffer::for_stream(Arc::new(FrameBuffer::new(desc)), stream.id)
}

/// Builder for a configured pipeline wired to a channel consumer
pub struct PipelineBuilder {
    config: PipelineConfig,
    backends: Backends,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            backends: Backends::software(),
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backends(mut self, backends: Backends) -> Self {
        self.backends = backends;
        self
    }

    pub fn build(self) -> (Pipeline, FrameReceiver) {
        let (consumer, frames) = ChannelConsumer::new();
        (
            Pipeline::new(self.config, self.backends, Arc::new(consumer)),
            frames,
        )
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_caller_buffer_has_headroom() {
        let jpeg = stream(1, 16, 16, PixelFormat::Blob);
        let buffer = caller_buffer(&jpeg);
        assert_eq!(buffer.origin(), Some(StreamId(1)));
        assert!(buffer.frame().capacity() >= 64 * 1024);
    }
}
