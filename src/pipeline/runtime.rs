//! Pipeline runtime — owns the current graph and drives it.
//!
//! [`Pipeline::configure`] rebuilds the graph from scratch whenever the
//! stream set changes. A failed build leaves the pipeline unconfigured; the
//! previous graph has already been stopped and discarded by then.
//!
//! Per frame, [`Pipeline::process_frame`] hands each caller buffer to the
//! exit unit of its stream, registers a potential sync item with the Output
//! Join, and submits the input to every first-level unit.

use crate::backend::Backends;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::bridge::{FrameConsumer, TopologySnapshot};
use crate::pipeline::buffer::ProcBuffer;
use crate::pipeline::builder::{GraphBuilder, ProcessingGraph};
use crate::pipeline::error::{combine_status, PipelineError, PipelineResult};
use crate::pipeline::id::{StreamId, UnitId};
use crate::pipeline::settings::ProcessingSettings;
use crate::pipeline::transforms::copy::copy_frame;
use crate::pipeline::unit::ProcessingUnit;
use crate::types::{FrameDescriptor, OutputStreamDescriptor};
use std::sync::Arc;

pub struct Pipeline {
    config: PipelineConfig,
    backends: Backends,
    consumer: Arc<dyn FrameConsumer>,
    graph: Option<ProcessingGraph>,
    running: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, backends: Backends, consumer: Arc<dyn FrameConsumer>) -> Self {
        Self {
            config,
            backends,
            consumer,
            graph: None,
            running: false,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.graph.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn graph(&self) -> Option<&ProcessingGraph> {
        self.graph.as_ref()
    }

    fn graph_or_err(&self) -> PipelineResult<&ProcessingGraph> {
        self.graph.as_ref().ok_or(PipelineError::NotConfigured)
    }

    // ── Configuration ──

    /// Build a graph for `streams`. Returns whether the primary stream needs post-processing.
    pub fn configure(
        &mut self,
        input: &FrameDescriptor,
        streams: &[OutputStreamDescriptor],
    ) -> PipelineResult<bool> {
        self.teardown();

        let built = GraphBuilder::new(&self.config, &self.backends).build(
            input,
            streams,
            Arc::clone(&self.consumer),
        );
        match built {
            Ok(graph) => {
                let needs_post_process = graph.needs_post_process();
                tracing::info!(
                    "Pipeline configured for {}x{} {} with {} streams",
                    input.width,
                    input.height,
                    input.format,
                    streams.len()
                );
                self.graph = Some(graph);
                Ok(needs_post_process)
            }
            Err(e) => {
                tracing::error!("Pipeline configuration failed: {}", e);
                Err(e)
            }
        }
    }

    /// Stop and discard the current graph, returning held buffers to their owners.
    pub fn teardown(&mut self) {
        self.stop();
        if let Some(graph) = self.graph.take() {
            if let Err(e) = flush_graph(&graph) {
                tracing::warn!("Flush during teardown reported: {}", e);
            }
            tracing::info!("Discarded processing graph with {} units", graph.unit_count());
        }
    }

    // ── Lifecycle ──

    /// Start every unit, first level first.
    pub fn start(&mut self) -> PipelineResult<()> {
        let graph = self.graph_or_err()?;
        let order = graph.level_order();
        for (i, unit) in order.iter().enumerate() {
            if let Err(e) = unit.start() {
                tracing::error!("Failed to start unit {}: {}", unit.name(), e);
                order[..i].iter().for_each(|u| u.stop());
                return Err(e);
            }
        }
        self.running = true;
        tracing::info!("Pipeline started ({} units)", order.len());
        Ok(())
    }

    /// Stop every unit. Waits for all workers to exit.
    pub fn stop(&mut self) {
        if let Some(graph) = &self.graph {
            for unit in graph.level_order() {
                unit.stop();
            }
            if self.running {
                tracing::info!("Pipeline stopped");
            }
        }
        self.running = false;
    }

    /// Drop pending work in every unit, then release pending sync items.
    pub fn flush(&self) -> PipelineResult<()> {
        flush_graph(self.graph_or_err()?)
    }

    // ── Frame path ──

    /// Inject one input frame together with the caller buffers it should fill.
    ///
    /// Every output must be tagged with the stream it was supplied for.
    pub fn process_frame(
        &self,
        input: ProcBuffer,
        outputs: Vec<ProcBuffer>,
        settings: Arc<ProcessingSettings>,
    ) -> PipelineResult<()> {
        let graph = self.graph_or_err()?;
        if !self.running {
            return Err(PipelineError::InvalidConfiguration("pipeline is not started".into()));
        }

        // Route everything before touching any unit
        let mut routed: Vec<(&Arc<ProcessingUnit>, ProcBuffer)> = Vec::with_capacity(outputs.len());
        let mut direct: Vec<(StreamId, ProcBuffer)> = Vec::new();
        for out in &outputs {
            let stream = out.origin().ok_or_else(|| {
                PipelineError::InvalidConfiguration(format!("output {} has no stream identity", out.id()))
            })?;
            if graph.is_direct(stream) {
                direct.push((stream, out.clone()));
                continue;
            }
            let exit = graph.exit_for(stream).ok_or_else(|| {
                PipelineError::InvalidConfiguration(format!("stream {} is not configured", stream))
            })?;
            routed.push((exit, out.clone()));
        }

        graph.join().register_potential_sync(&input, &outputs);

        let mut result = Ok(());
        for (exit, out) in routed {
            exit.queue_caller_buffer(out, Some(Arc::clone(&settings)))?;
        }

        for (stream, out) in direct {
            let delivered = if out.same_buffer(&input) {
                input.clone().with_origin(stream)
            } else {
                copy_frame(&input, &out);
                out
            };
            tracing::debug!("Direct route for stream {}: {}", stream, delivered.id());
            result = combine_status(
                result,
                graph.join().notify(delivered, Arc::clone(&settings), Ok(())),
            );
        }

        for unit in graph.first_level() {
            result = combine_status(
                result,
                unit.submit_frame(input.clone(), Arc::clone(&settings), Ok(())),
            );
        }
        result
    }

    // ── Runtime toggles and inspection ──

    fn unit(&self, id: UnitId) -> PipelineResult<&Arc<ProcessingUnit>> {
        self.graph_or_err()?
            .unit(id)
            .ok_or_else(|| PipelineError::InvalidConfiguration(format!("unknown unit {}", id)))
    }

    /// Disabled units forward their input untouched.
    pub fn set_unit_enabled(&self, id: UnitId, enabled: bool) -> PipelineResult<()> {
        let unit = self.unit(id)?;
        unit.set_enabled(enabled);
        tracing::info!("Unit {} {}", unit.name(), if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Synchronous units run their transform on the submitting thread.
    pub fn set_unit_sync(&self, id: UnitId, sync: bool) -> PipelineResult<()> {
        let unit = self.unit(id)?;
        unit.set_sync(sync);
        tracing::info!("Unit {} set to {} mode", unit.name(), if sync { "sync" } else { "async" });
        Ok(())
    }

    pub fn topology(&self) -> PipelineResult<TopologySnapshot> {
        Ok(self.graph_or_err()?.snapshot())
    }

    pub fn topology_json(&self) -> Result<String> {
        let snapshot = self.topology()?;
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn flush_graph(graph: &ProcessingGraph) -> PipelineResult<()> {
    let units = graph
        .level_order()
        .iter()
        .fold(Ok(()), |acc, unit| combine_status(acc, unit.flush()));
    combine_status(units, graph.join().flush())
}
