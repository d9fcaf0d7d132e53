//! Frame post-processing demo
//!
//! Builds a pipeline from a config file, feeds it synthetic frames and logs
//! what the consumer receives.

use anyhow::Context;
use clap::Parser;
use frame_postproc::{
    backend::{Backends, FrameSource, HeapAllocator, SoftwareJpegEngine, TestPatternSource},
    config::{default_config_path, PipelineConfig},
    pipeline::{ChannelConsumer, FrameBuffer, Pipeline, ProcBuffer, ProcessingSettings, StreamId},
    types::{FrameDescriptor, OutputStreamDescriptor, PixelFormat},
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Caller buffers allocated per stream
const BUFFERS_PER_STREAM: usize = 4;

#[derive(Parser, Debug)]
#[command(name = "frame-postproc", version, about = "Camera frame post-processing pipeline demo")]
struct Args {
    /// Pipeline config (TOML or JSON). Defaults to the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames to push through the pipeline
    #[arg(short, long, default_value_t = 30)]
    frames: u64,
}

fn default_streams() -> Vec<OutputStreamDescriptor> {
    vec![
        OutputStreamDescriptor::new(StreamId(1), 1920, 1080, PixelFormat::Nv12),
        OutputStreamDescriptor::new(StreamId(2), 640, 480, PixelFormat::Nv12),
        OutputStreamDescriptor::new(StreamId(3), 1920, 1080, PixelFormat::Blob),
    ]
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,frame_postproc=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = match args.config.or_else(default_config_path) {
        Some(path) if path.exists() => {
            tracing::info!("Loading config from {:?}", path);
            PipelineConfig::load(&path).with_context(|| format!("loading {:?}", path))?
        }
        _ => {
            tracing::info!("No config file found, using defaults");
            PipelineConfig::default()
        }
    };

    let input = config.input.unwrap_or_else(|| FrameDescriptor::nv12(1920, 1080));
    let streams = if config.streams.is_empty() {
        default_streams()
    } else {
        config.streams.clone()
    };

    let backends = Backends::software()
        .with_allocator(Arc::new(HeapAllocator::new()))
        .with_jpeg(Arc::new(SoftwareJpegEngine::new(config.jpeg_quality)));
    let (consumer, frames) = ChannelConsumer::new();
    let mut pipeline = Pipeline::new(config, backends, Arc::new(consumer));

    let needs_post_process = pipeline.configure(&input, &streams)?;
    tracing::info!("Primary stream needs post-processing: {}", needs_post_process);
    tracing::info!("Topology:\n{}", pipeline.topology_json()?);
    pipeline.start()?;

    // Caller buffers circulate: each delivery is recycled into the next request.
    let mut free: HashMap<StreamId, Vec<Arc<FrameBuffer>>> = streams
        .iter()
        .map(|s| {
            let buffers = (0..BUFFERS_PER_STREAM)
                .map(|_| Arc::new(FrameBuffer::new(s.frame_descriptor())))
                .collect();
            (s.id, buffers)
        })
        .collect();

    let mut source = TestPatternSource::new(input, BUFFERS_PER_STREAM)?;
    let mut delivered: HashMap<StreamId, (u64, u64)> = HashMap::new();
    let started = Instant::now();

    for request_id in 0..args.frames {
        let (frame, _) = source.get_frame()?;
        let input_buffer = ProcBuffer::wrap(frame);
        let outputs: Vec<ProcBuffer> = streams
            .iter()
            .filter_map(|s| {
                let is_direct = pipeline
                    .graph()
                    .map(|g| g.is_direct(s.id))
                    .unwrap_or(false);
                if is_direct {
                    return Some(input_buffer.clone().with_origin(s.id));
                }
                free.get_mut(&s.id)?.pop().map(|b| ProcBuffer::for_stream(b, s.id))
            })
            .collect();

        let settings = ProcessingSettings::for_request(request_id)
            .with_timestamp(started.elapsed().as_nanos() as u64)
            .shared();
        pipeline.process_frame(input_buffer, outputs, settings)?;

        for ready in frames.collect(streams.len(), Duration::from_secs(2)) {
            let Some(stream) = ready.stream() else {
                continue;
            };
            let entry = delivered.entry(stream).or_default();
            match &ready.status {
                Ok(()) => entry.0 += 1,
                Err(e) => {
                    entry.1 += 1;
                    tracing::warn!("Request {} stream {} failed: {}", ready.settings.request_id, stream, e);
                }
            }
            tracing::debug!(
                "Request {} stream {}: {} bytes",
                ready.settings.request_id,
                stream,
                ready.buffer.frame().bytes_used()
            );
            let is_direct = pipeline.graph().map(|g| g.is_direct(stream)).unwrap_or(false);
            if let (false, Some(pool)) = (is_direct, free.get_mut(&stream)) {
                pool.push(Arc::clone(ready.buffer.frame()));
            }
        }
    }

    pipeline.flush()?;
    pipeline.stop();

    for stream in &streams {
        let (ok, failed) = delivered.get(&stream.id).copied().unwrap_or_default();
        tracing::info!(
            "Stream {} ({}x{} {}): {} delivered, {} failed",
            stream.id,
            stream.width,
            stream.height,
            stream.format,
            ok,
            failed
        );
    }
    tracing::info!(
        "Processed {} frames in {:.1?}",
        source.sequence(),
        started.elapsed()
    );
    Ok(())
}
