//! Processing unit — one stage of the graph with its own worker thread.
//!
//! A unit owns a FIFO input queue, an optional private buffer pool, and a
//! list of downstream listeners. Its worker pops `(input, settings, status)`
//! entries in submission order, obtains an output buffer according to the
//! unit's [`BufferMode`], runs the transform, and notifies every listener.
//!
//! # Locking
//!
//! - `transform` is held while one frame is processed and forwarded, so
//!   frames leave a unit in the order they were processed.
//! - `state` (caller buffers, pool, flags) is only held for short updates,
//!   never across a transform or a listener call.
//! - Locks are always taken transform → state.

use crate::backend::BufferAllocator;
use crate::pipeline::bridge::{FrameConsumer, UnitStats};
use crate::pipeline::buffer::{BufferMode, ProcBuffer};
use crate::pipeline::error::{combine_status, FrameStatus, PipelineError, PipelineResult};
use crate::pipeline::id::UnitId;
use crate::pipeline::join::OutputJoin;
use crate::pipeline::pool::BufferPool;
use crate::pipeline::settings::ProcessingSettings;
use crate::pipeline::transform::{AnyTransform, TransformKind, TransformOutcome};
use crate::types::FrameDescriptor;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Downstream consumer of a unit's output.
#[derive(Clone)]
pub enum Listener {
    Unit(Arc<ProcessingUnit>),
    Join(Arc<OutputJoin>),
    Observer(Arc<dyn FrameConsumer>),
}

impl Listener {
    pub fn notify(
        &self,
        buffer: ProcBuffer,
        settings: Arc<ProcessingSettings>,
        status: FrameStatus,
    ) -> PipelineResult<()> {
        match self {
            Listener::Unit(unit) => unit.submit_frame(buffer, settings, status),
            Listener::Join(join) => join.notify(buffer, settings, status),
            Listener::Observer(observer) => observer.on_frame_ready(buffer, settings, status),
        }
    }

    /// Id of the downstream unit, if the listener is one
    pub fn unit_id(&self) -> Option<UnitId> {
        match self {
            Listener::Unit(unit) => Some(unit.id()),
            _ => None,
        }
    }
}

struct QueuedFrame {
    input: ProcBuffer,
    settings: Arc<ProcessingSettings>,
    status: FrameStatus,
}

/// Caller buffer plus the request it was queued for; delivery is tagged with that
/// request rather than the frame that happened to fill it.
type CallerBuffer = (ProcBuffer, Option<Arc<ProcessingSettings>>);

struct UnitState {
    caller_buffers: VecDeque<CallerBuffer>,
    /// Output kept across inputs while the transform asks for more
    current: Option<CallerBuffer>,
    pool: Option<BufferPool>,
    output_desc: Option<FrameDescriptor>,
    enabled: bool,
    sync: bool,
    running: bool,
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// One stage of the processing graph.
pub struct ProcessingUnit {
    id: UnitId,
    name: String,
    mode: BufferMode,
    kind: TransformKind,
    transform: Mutex<AnyTransform>,
    state: Mutex<UnitState>,
    listeners: RwLock<Vec<Listener>>,
    frame_tx: Sender<QueuedFrame>,
    frame_rx: Receiver<QueuedFrame>,
    worker: Mutex<Option<Worker>>,
    counters: Counters,
}

impl ProcessingUnit {
    pub fn new(id: UnitId, name: impl Into<String>, mode: BufferMode, transform: AnyTransform) -> Self {
        let (frame_tx, frame_rx) = unbounded();
        Self {
            id,
            name: name.into(),
            mode,
            kind: transform.kind(),
            transform: Mutex::new(transform),
            state: Mutex::new(UnitState {
                caller_buffers: VecDeque::new(),
                current: None,
                pool: None,
                output_desc: None,
                enabled: true,
                sync: false,
                running: false,
            }),
            listeners: RwLock::new(Vec::new()),
            frame_tx,
            frame_rx,
            worker: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    // ── Configuration ──

    /// Allocate the private pool (pool-owned units) and stage resources.
    pub fn prepare(
        &self,
        input: &FrameDescriptor,
        output: &FrameDescriptor,
        pool_depth: usize,
        allocator: &dyn BufferAllocator,
    ) -> PipelineResult<()> {
        let mut transform = lock(&self.transform);
        if !transform.check_format(input, output) {
            let bad = if input.format.is_semi_planar() {
                output.format
            } else {
                input.format
            };
            return Err(PipelineError::UnsupportedFormat(bad));
        }

        let pool = match self.mode {
            BufferMode::Pool => Some(
                BufferPool::create(pool_depth, *output, allocator).map_err(|e| match e {
                    PipelineError::Pool(msg) => {
                        PipelineError::Allocation(format!("{}: {}", self.name, msg))
                    }
                    other => other,
                })?,
            ),
            BufferMode::Caller | BufferMode::Aliased => None,
        };
        transform.prepare(input, output)?;

        let mut state = lock(&self.state);
        state.pool = pool;
        state.output_desc = Some(*output);
        tracing::debug!(
            "Prepared unit {} ({}): {}x{} {} -> {}x{} {}, {} buffers",
            self.id,
            self.name,
            input.width,
            input.height,
            input.format,
            output.width,
            output.height,
            output.format,
            self.mode
        );
        Ok(())
    }

    pub fn output_descriptor(&self) -> Option<FrameDescriptor> {
        lock(&self.state).output_desc
    }

    pub fn attach_listener(&self, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Ids of downstream units, in registration order
    pub fn downstream_units(&self) -> Vec<UnitId> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Listener::unit_id)
            .collect()
    }

    /// Supply a caller-owned output buffer.
    pub fn add_output_buffer(&self, buffer: ProcBuffer) -> PipelineResult<()> {
        self.queue_caller_buffer(buffer, None)
    }

    pub(crate) fn queue_caller_buffer(
        &self,
        buffer: ProcBuffer,
        settings: Option<Arc<ProcessingSettings>>,
    ) -> PipelineResult<()> {
        if self.mode != BufferMode::Caller {
            return Err(PipelineError::InvalidConfiguration(format!(
                "unit {} uses {} buffers, caller buffers are not accepted",
                self.name, self.mode
            )));
        }
        lock(&self.state).caller_buffers.push_back((buffer, settings));
        Ok(())
    }

    /// Caller buffers waiting for a frame
    pub fn queued_output_buffers(&self) -> usize {
        lock(&self.state).caller_buffers.len()
    }

    /// Disabled units forward their input untouched.
    pub fn set_enabled(&self, enabled: bool) {
        lock(&self.state).enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    /// Synchronous units process on the submitting thread.
    pub fn set_sync(&self, sync: bool) {
        lock(&self.state).sync = sync;
    }

    pub fn is_sync(&self) -> bool {
        lock(&self.state).sync
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    /// Pending inputs
    pub fn queue_len(&self) -> usize {
        self.frame_rx.len()
    }

    /// Pool slots currently checked out, for pool-owned units
    pub fn pool_outstanding(&self) -> Option<usize> {
        lock(&self.state).pool.as_ref().map(BufferPool::outstanding)
    }

    pub fn stats(&self) -> UnitStats {
        UnitStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    // ── Lifecycle ──

    /// Spawn the worker. No-op if already running.
    pub fn start(self: &Arc<Self>) -> PipelineResult<()> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(());
        }

        // inputs left queued by an earlier stop are processed once running
        lock(&self.state).running = true;
        let (stop_tx, stop_rx) = unbounded();
        let unit = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(format!("unit-{}", self.name))
            .spawn(move || unit.run(stop_rx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                lock(&self.state).running = false;
                return Err(PipelineError::Allocation(format!(
                    "failed to spawn worker for {}: {}",
                    self.name, e
                )));
            }
        };

        *worker = Some(Worker { stop_tx, handle });
        tracing::debug!("Started unit {} ({})", self.id, self.name);
        Ok(())
    }

    /// Stop the worker and wait for it to exit. No-op if already stopped.
    pub fn stop(&self) {
        let worker = lock(&self.worker).take();
        let Some(worker) = worker else {
            return;
        };

        lock(&self.state).running = false;
        drop(worker.stop_tx);
        if worker.handle.join().is_err() {
            tracing::error!("Worker of unit {} panicked", self.name);
        }
        tracing::debug!("Stopped unit {} ({})", self.id, self.name);
    }

    /// Drop pending inputs and in-flight outputs.
    ///
    /// Caller-owned buffers that were waiting for a frame are handed to the
    /// listeners with [`PipelineError::Flushed`] so their owner gets them back.
    pub fn flush(&self) -> PipelineResult<()> {
        let dropped_inputs = self.frame_rx.try_iter().count();

        let (mut returned, current) = {
            let mut state = lock(&self.state);
            let returned: Vec<CallerBuffer> = state.caller_buffers.drain(..).collect();
            (returned, state.current.take())
        };
        if let Some(current) = current {
            if self.mode == BufferMode::Caller {
                returned.insert(0, current);
            }
        }

        if dropped_inputs > 0 || !returned.is_empty() {
            tracing::debug!(
                "Flushed unit {}: {} inputs dropped, {} buffers returned",
                self.name,
                dropped_inputs,
                returned.len()
            );
        }

        let fallback = Arc::new(ProcessingSettings::default());
        returned.into_iter().fold(Ok(()), |acc, (buffer, settings)| {
            let settings = settings.unwrap_or_else(|| Arc::clone(&fallback));
            combine_status(acc, self.notify_listeners(buffer, settings, Err(PipelineError::Flushed)))
        })
    }

    // ── Frame path ──

    /// Queue one input, or process it inline in synchronous mode.
    ///
    /// An error `status` skips the transform and travels downstream on this
    /// unit's output carrier.
    pub fn submit_frame(
        &self,
        input: ProcBuffer,
        settings: Arc<ProcessingSettings>,
        status: FrameStatus,
    ) -> PipelineResult<()> {
        let (enabled, sync, running) = {
            let state = lock(&self.state);
            (state.enabled, state.sync, state.running)
        };

        if !running {
            tracing::warn!("Unit {} is stopped, dropping {}", self.name, input.id());
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        if !enabled {
            return self.notify_listeners(input, settings, status);
        }

        let frame = QueuedFrame {
            input,
            settings,
            status,
        };

        if sync {
            return self.process(frame);
        }

        self.frame_tx
            .send(frame)
            .map_err(|_| PipelineError::ProcessingFailed(format!("input queue of {} closed", self.name)))
    }

    fn run(&self, stop_rx: Receiver<()>) {
        tracing::trace!("Worker for {} started", self.name);
        loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(self.frame_rx) -> msg => {
                    let Ok(frame) = msg else { break };
                    if !self.is_running() {
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    if let Err(e) = self.process(frame) {
                        tracing::debug!("Unit {}: {}", self.name, e);
                    }
                }
            }
        }
        tracing::trace!("Worker for {} exiting", self.name);
    }

    fn process(&self, frame: QueuedFrame) -> PipelineResult<()> {
        let QueuedFrame {
            input,
            settings,
            status,
        } = frame;
        let mut transform = lock(&self.transform);

        if let Err(e) = status {
            return match self.error_carrier(&input) {
                Some((carrier, stored)) => {
                    self.notify_listeners(carrier, stored.unwrap_or(settings), Err(e))
                }
                None => Ok(()),
            };
        }

        let (output, output_settings) = match self.acquire_output(&input) {
            Some(output) => output,
            None => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Unit {}: no output buffer, dropping {}", self.name, input.id());
                return match self.mode {
                    // downstream exits still hold caller buffers for this frame
                    BufferMode::Pool => {
                        self.notify_listeners(input, settings, Err(PipelineError::ProcessingDropped))
                    }
                    BufferMode::Caller | BufferMode::Aliased => Ok(()),
                };
            }
        };

        match transform.process(&input, &output, &settings) {
            Ok(TransformOutcome::NeedMoreInput) => {
                lock(&self.state).current = Some((output, output_settings));
                Ok(())
            }
            Ok(TransformOutcome::Produced) => {
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                self.notify_listeners(output, output_settings.unwrap_or(settings), Ok(()))
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Unit {} failed on {}: {}", self.name, input.id(), e);
                let settings = output_settings.unwrap_or(settings);
                let notified = self.notify_listeners(output, settings, Err(e.clone()));
                combine_status(Err(e), notified)
            }
        }
    }

    fn acquire_output(&self, input: &ProcBuffer) -> Option<CallerBuffer> {
        let mut state = lock(&self.state);
        if let Some(current) = state.current.take() {
            return Some(current);
        }
        match self.mode {
            BufferMode::Pool => state.pool.as_ref()?.acquire().map(|b| (b, None)),
            BufferMode::Caller => state.caller_buffers.pop_front(),
            BufferMode::Aliased => Some((input.clone(), None)),
        }
    }

    /// Buffer that carries an upstream error past this unit
    fn error_carrier(&self, input: &ProcBuffer) -> Option<CallerBuffer> {
        match self.mode {
            BufferMode::Caller => {
                let mut state = lock(&self.state);
                let carrier = state.current.take().or_else(|| state.caller_buffers.pop_front());
                if carrier.is_none() {
                    tracing::warn!("Unit {}: no caller buffer to carry upstream error", self.name);
                }
                carrier
            }
            BufferMode::Pool | BufferMode::Aliased => Some((input.clone(), None)),
        }
    }

    /// Notify every listener in registration order, combining their results.
    fn notify_listeners(
        &self,
        buffer: ProcBuffer,
        settings: Arc<ProcessingSettings>,
        status: FrameStatus,
    ) -> PipelineResult<()> {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if listeners.is_empty() {
            tracing::warn!("Unit {} has no listeners, {} discarded", self.name, buffer.id());
            return Ok(());
        }
        listeners.iter().fold(Ok(()), |acc, listener| {
            let result = listener.notify(buffer.clone(), Arc::clone(&settings), status.clone());
            combine_status(acc, result)
        })
    }
}

impl std::fmt::Debug for ProcessingUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingUnit")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::allocator::MockBufferAllocator;
    use crate::backend::{AllocError, HeapAllocator};
    use crate::pipeline::bridge::{ChannelConsumer, FrameReceiver};
    use crate::pipeline::buffer::FrameBuffer;
    use crate::pipeline::id::StreamId;
    use crate::pipeline::transform::{BuiltinTransform, TransformPlugin};
    use crate::pipeline::transforms::CopyTransform;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn copy_unit(mode: BufferMode) -> Arc<ProcessingUnit> {
        Arc::new(ProcessingUnit::new(
            UnitId(0),
            "copy",
            mode,
            BuiltinTransform::Copy(CopyTransform::new()).into(),
        ))
    }

    fn input(fill: u8) -> ProcBuffer {
        let desc = FrameDescriptor::nv12(8, 4);
        ProcBuffer::wrap(Arc::new(FrameBuffer::from_bytes(desc, vec![fill; desc.size])))
    }

    fn observed(unit: &ProcessingUnit) -> FrameReceiver {
        let (consumer, rx) = ChannelConsumer::new();
        unit.attach_listener(Listener::Observer(Arc::new(consumer)));
        rx
    }

    struct Failing;

    impl TransformPlugin for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn process(
            &mut self,
            _input: &ProcBuffer,
            _output: &ProcBuffer,
            _settings: &ProcessingSettings,
        ) -> PipelineResult<TransformOutcome> {
            Err(PipelineError::ProcessingFailed("boom".into()))
        }
    }

    /// Emits one output for every two inputs
    struct Pairing {
        seen: usize,
    }

    impl TransformPlugin for Pairing {
        fn name(&self) -> &str {
            "pairing"
        }

        fn process(
            &mut self,
            _input: &ProcBuffer,
            _output: &ProcBuffer,
            _settings: &ProcessingSettings,
        ) -> PipelineResult<TransformOutcome> {
            self.seen += 1;
            Ok(if self.seen % 2 == 0 {
                TransformOutcome::Produced
            } else {
                TransformOutcome::NeedMoreInput
            })
        }
    }

    #[test]
    fn test_add_output_buffer_requires_caller_mode() {
        let unit = copy_unit(BufferMode::Pool);
        let err = unit.add_output_buffer(input(0)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
        assert!(copy_unit(BufferMode::Caller).add_output_buffer(input(0)).is_ok());
    }

    #[test]
    fn test_prepare_allocation_failure() {
        let mut allocator = MockBufferAllocator::new();
        allocator
            .expect_allocate()
            .returning(|_| Err(AllocError::NoMemory(64)));
        let unit = copy_unit(BufferMode::Pool);
        let desc = FrameDescriptor::nv12(8, 4);
        let err = unit.prepare(&desc, &desc, 4, &allocator).unwrap_err();
        assert!(matches!(err, PipelineError::Allocation(_)));
    }

    #[test]
    fn test_start_stop_idempotent() {
        let unit = copy_unit(BufferMode::Aliased);
        unit.stop();
        unit.start().unwrap();
        unit.start().unwrap();
        assert!(unit.is_running());
        unit.stop();
        unit.stop();
        assert!(!unit.is_running());
    }

    #[test]
    fn test_sync_mode_runs_inline() {
        let unit = copy_unit(BufferMode::Caller);
        let rx = observed(&unit);
        unit.set_sync(true);
        unit.start().unwrap();
        let out = ProcBuffer::for_stream(Arc::new(FrameBuffer::new(FrameDescriptor::nv12(8, 4))), StreamId(1));
        unit.add_output_buffer(out.clone()).unwrap();
        unit.submit_frame(input(5), ProcessingSettings::default().shared(), Ok(()))
            .unwrap();
        let frames = rx.drain();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].buffer.same_buffer(&out));
        assert_eq!(out.frame().to_vec(), vec![5; 48]);
        unit.stop();
    }

    #[test]
    fn test_async_mode_uses_worker() {
        let unit = copy_unit(BufferMode::Pool);
        let desc = FrameDescriptor::nv12(8, 4);
        unit.prepare(&desc, &desc, 2, &HeapAllocator::new()).unwrap();
        let rx = observed(&unit);
        unit.start().unwrap();
        unit.submit_frame(input(3), ProcessingSettings::default().shared(), Ok(()))
            .unwrap();
        let frame = rx.recv_timeout(TIMEOUT).unwrap();
        assert!(frame.buffer.is_pooled());
        assert_eq!(frame.buffer.frame().to_vec(), vec![3; 48]);
        unit.stop();
        assert_eq!(unit.stats().processed, 1);
    }

    #[test]
    fn test_disabled_unit_forwards_input() {
        let unit = copy_unit(BufferMode::Caller);
        let rx = observed(&unit);
        unit.set_enabled(false);
        unit.start().unwrap();
        let frame = input(1);
        unit.submit_frame(frame.clone(), ProcessingSettings::default().shared(), Ok(()))
            .unwrap();
        let frames = rx.drain();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].buffer.same_buffer(&frame));
        unit.stop();
    }

    #[test]
    fn test_exhausted_pool_drops() {
        let unit = copy_unit(BufferMode::Pool);
        let desc = FrameDescriptor::nv12(8, 4);
        unit.prepare(&desc, &desc, 1, &HeapAllocator::new()).unwrap();
        unit.set_sync(true);
        unit.start().unwrap();
        let rx = observed(&unit);

        unit.submit_frame(input(1), ProcessingSettings::default().shared(), Ok(()))
            .unwrap();
        let held = rx.drain();
        assert_eq!(held.len(), 1);

        // the only slot is still held by the observer's copy
        unit.submit_frame(input(2), ProcessingSettings::default().shared(), Ok(()))
            .unwrap();
        let dropped = rx.drain();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].status, Err(PipelineError::ProcessingDropped));
        assert_eq!(unit.stats().dropped, 1);

        drop(held);
        drop(dropped);
        assert_eq!(unit.pool_outstanding(), Some(0));
        unit.stop();
    }

    #[test]
    fn test_failure_forwards_caller_buffer() {
        let unit = Arc::new(ProcessingUnit::new(
            UnitId(1),
            "failing",
            BufferMode::Caller,
            AnyTransform::Plugin(Box::new(Failing)),
        ));
        unit.set_sync(true);
        unit.start().unwrap();
        let rx = observed(&unit);
        let out = ProcBuffer::for_stream(Arc::new(FrameBuffer::new(FrameDescriptor::nv12(8, 4))), StreamId(3));
        unit.add_output_buffer(out.clone()).unwrap();
        let result = unit.submit_frame(input(0), ProcessingSettings::default().shared(), Ok(()));
        assert!(result.is_err());
        let frames = rx.drain();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].buffer.same_buffer(&out));
        assert!(!frames[0].is_ok());
        assert_eq!(unit.stats().failed, 1);
        unit.stop();
    }

    #[test]
    fn test_upstream_error_skips_transform() {
        let unit = copy_unit(BufferMode::Caller);
        unit.set_sync(true);
        unit.start().unwrap();
        let rx = observed(&unit);
        let out = ProcBuffer::for_stream(Arc::new(FrameBuffer::new(FrameDescriptor::nv12(8, 4))), StreamId(3));
        unit.add_output_buffer(out.clone()).unwrap();
        unit.submit_frame(
            input(9),
            ProcessingSettings::default().shared(),
            Err(PipelineError::Encode("upstream".into())),
        )
        .unwrap();
        let frames = rx.drain();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].buffer.same_buffer(&out));
        assert_eq!(frames[0].status, Err(PipelineError::Encode("upstream".into())));
        // untouched: zero-filled
        assert_eq!(out.frame().to_vec(), vec![0; 48]);
        unit.stop();
    }

    #[test]
    fn test_need_more_input_keeps_output() {
        let unit = Arc::new(ProcessingUnit::new(
            UnitId(2),
            "pairing",
            BufferMode::Caller,
            AnyTransform::Plugin(Box::new(Pairing { seen: 0 })),
        ));
        unit.set_sync(true);
        unit.start().unwrap();
        let rx = observed(&unit);
        let first = ProcBuffer::for_stream(Arc::new(FrameBuffer::new(FrameDescriptor::nv12(8, 4))), StreamId(1));
        let second = ProcBuffer::for_stream(Arc::new(FrameBuffer::new(FrameDescriptor::nv12(8, 4))), StreamId(1));
        unit.add_output_buffer(first.clone()).unwrap();
        unit.add_output_buffer(second).unwrap();

        let settings = ProcessingSettings::default().shared();
        unit.submit_frame(input(1), Arc::clone(&settings), Ok(())).unwrap();
        assert!(rx.is_empty());
        unit.submit_frame(input(2), settings, Ok(())).unwrap();
        let frames = rx.drain();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].buffer.same_buffer(&first));
        assert_eq!(unit.queued_output_buffers(), 1);
        unit.stop();
    }

    #[test]
    fn test_flush_returns_caller_buffers() {
        let unit = copy_unit(BufferMode::Caller);
        let rx = observed(&unit);
        for stream in 0..3 {
            let buf = ProcBuffer::for_stream(Arc::new(FrameBuffer::new(FrameDescriptor::nv12(8, 4))), StreamId(stream));
            unit.add_output_buffer(buf).unwrap();
        }
        unit.flush().unwrap();
        let frames = rx.drain();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.status == Err(PipelineError::Flushed)));
        assert_eq!(unit.queued_output_buffers(), 0);
    }

    #[test]
    fn test_fifo_order_across_producers() {
        let unit = copy_unit(BufferMode::Aliased);
        let rx = observed(&unit);
        unit.start().unwrap();
        let settings: Vec<_> = (0..50u64).map(|i| ProcessingSettings::for_request(i).shared()).collect();
        for s in &settings {
            unit.submit_frame(input(0), Arc::clone(s), Ok(())).unwrap();
        }
        let frames = rx.collect(50, TIMEOUT);
        unit.stop();
        let ids: Vec<u64> = frames.iter().map(|f| f.settings.request_id).collect();
        assert_eq!(ids, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_stopped_unit_drops_input() {
        let unit = copy_unit(BufferMode::Aliased);
        let rx = observed(&unit);
        unit.submit_frame(input(0), ProcessingSettings::default().shared(), Ok(()))
            .unwrap();
        assert!(rx.is_empty());
        assert_eq!(unit.stats().dropped, 1);
    }

    #[test]
    fn test_sync_unit_drops_after_stop() {
        let unit = copy_unit(BufferMode::Aliased);
        let rx = observed(&unit);
        unit.set_sync(true);
        unit.start().unwrap();
        unit.stop();
        unit.submit_frame(input(4), ProcessingSettings::default().shared(), Ok(()))
            .unwrap();
        assert!(rx.is_empty());
        let stats = unit.stats();
        assert_eq!((stats.processed, stats.dropped), (0, 1));
    }

    #[test]
    fn test_disabled_unit_drops_after_stop() {
        let unit = copy_unit(BufferMode::Aliased);
        let rx = observed(&unit);
        unit.set_enabled(false);
        unit.submit_frame(input(4), ProcessingSettings::default().shared(), Ok(()))
            .unwrap();
        assert!(rx.is_empty());
        assert_eq!(unit.stats().dropped, 1);
    }

    #[test]
    fn test_caller_buffer_delivered_with_its_request() {
        let unit = copy_unit(BufferMode::Caller);
        unit.set_sync(true);
        unit.start().unwrap();
        let rx = observed(&unit);
        let out = ProcBuffer::for_stream(Arc::new(FrameBuffer::new(FrameDescriptor::nv12(8, 4))), StreamId(2));
        unit.queue_caller_buffer(out.clone(), Some(ProcessingSettings::for_request(7).shared()))
            .unwrap();
        unit.submit_frame(input(1), ProcessingSettings::for_request(3).shared(), Ok(()))
            .unwrap();
        let frames = rx.drain();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].buffer.same_buffer(&out));
        assert_eq!(frames[0].settings.request_id, 7);

        // upstream errors are tagged the same way
        let out = ProcBuffer::for_stream(Arc::new(FrameBuffer::new(FrameDescriptor::nv12(8, 4))), StreamId(2));
        unit.queue_caller_buffer(out, Some(ProcessingSettings::for_request(8).shared()))
            .unwrap();
        unit.submit_frame(
            input(1),
            ProcessingSettings::for_request(4).shared(),
            Err(PipelineError::ProcessingDropped),
        )
        .unwrap();
        assert_eq!(rx.drain()[0].settings.request_id, 8);
        unit.stop();
    }
}
