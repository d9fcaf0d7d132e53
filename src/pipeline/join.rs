//! Output Join — the terminal listener of every stream.
//!
//! When a frame's outputs include the input buffer itself (an aliased stream
//! next to streams derived from it), the aliased buffer must not reach the
//! consumer while other streams are still reading it. [`register_potential_sync`]
//! records such frames as a [`SyncItem`]; [`notify`] counts the outputs down and
//! forwards all of them together once the last one arrives.
//!
//! [`register_potential_sync`]: OutputJoin::register_potential_sync
//! [`notify`]: OutputJoin::notify

use crate::pipeline::bridge::FrameConsumer;
use crate::pipeline::buffer::ProcBuffer;
use crate::pipeline::error::{combine_status, FrameStatus, PipelineError, PipelineResult};
use crate::pipeline::id::BufferId;
use crate::pipeline::settings::ProcessingSettings;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Release = (Arc<ProcessingSettings>, FrameStatus);

/// Outputs of one frame that resolve to a shared physical buffer.
pub struct SyncItem {
    outputs: Vec<ProcBuffer>,
    releases: Mutex<Vec<Option<Release>>>,
    remaining: AtomicUsize,
    forwarded: AtomicBool,
}

impl SyncItem {
    fn new(outputs: Vec<ProcBuffer>) -> Self {
        let count = outputs.len();
        Self {
            outputs,
            releases: Mutex::new(vec![None; count]),
            remaining: AtomicUsize::new(count),
            forwarded: AtomicBool::new(false),
        }
    }

    /// Outputs not yet released
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Record the release of `buffer`. Returns false if no unreleased output matches it.
    fn record(&self, buffer: &ProcBuffer, release: Release) -> bool {
        let mut releases = self.releases.lock().unwrap_or_else(PoisonError::into_inner);
        let open: Vec<usize> = (0..self.outputs.len())
            .filter(|&i| releases[i].is_none() && self.outputs[i].same_buffer(buffer))
            .collect();
        // prefer the output supplied for the same stream
        let slot = open
            .iter()
            .copied()
            .find(|&i| buffer.origin().is_some() && self.outputs[i].origin() == buffer.origin())
            .or_else(|| open.first().copied());
        match slot {
            Some(i) => {
                releases[i] = Some(release);
                true
            }
            None => false,
        }
    }

    /// Each output paired with the status it was released with, `fallback` for the rest.
    fn drain(&self, fallback: &Release) -> Vec<(ProcBuffer, Release)> {
        let mut releases = self.releases.lock().unwrap_or_else(PoisonError::into_inner);
        self.outputs
            .iter()
            .zip(releases.iter_mut())
            .map(|(out, rel)| (out.clone(), rel.take().unwrap_or_else(|| fallback.clone())))
            .collect()
    }
}

/// Terminal listener forwarding finished buffers to the outer consumer.
pub struct OutputJoin {
    consumer: Arc<dyn FrameConsumer>,
    may_need_sync: bool,
    items: Mutex<HashMap<BufferId, Arc<SyncItem>>>,
}

impl OutputJoin {
    /// `may_need_sync` is false when only one output stream exists.
    pub fn new(consumer: Arc<dyn FrameConsumer>, may_need_sync: bool) -> Self {
        Self {
            consumer,
            may_need_sync,
            items: Mutex::new(HashMap::new()),
        }
    }

    pub fn may_need_sync(&self) -> bool {
        self.may_need_sync
    }

    fn items(&self) -> MutexGuard<'_, HashMap<BufferId, Arc<SyncItem>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of sync items waiting for releases
    pub fn pending_items(&self) -> usize {
        let items = self.items();
        let mut seen: Vec<*const SyncItem> = items.values().map(Arc::as_ptr).collect();
        seen.sort();
        seen.dedup();
        seen.len()
    }

    /// Create a sync item when an output of this frame aliases the input.
    ///
    /// Called once per frame before the frame is dispatched. Returns whether
    /// an item was created.
    pub fn register_potential_sync(&self, input: &ProcBuffer, outputs: &[ProcBuffer]) -> bool {
        if !self.may_need_sync || outputs.len() < 2 {
            return false;
        }
        if !outputs.iter().any(|out| out.same_buffer(input)) {
            return false;
        }

        let item = Arc::new(SyncItem::new(outputs.to_vec()));
        let mut items = self.items();
        for out in outputs {
            if let Some(stale) = items.insert(out.id(), Arc::clone(&item)) {
                if !Arc::ptr_eq(&stale, &item) {
                    tracing::warn!("Replacing unreleased sync item for {}", out.id());
                }
            }
        }
        tracing::debug!(
            "Sync item for {}: {} outputs share the input buffer",
            input.id(),
            outputs.len()
        );
        true
    }

    /// Deliver one finished buffer.
    pub fn notify(
        &self,
        buffer: ProcBuffer,
        settings: Arc<ProcessingSettings>,
        status: FrameStatus,
    ) -> PipelineResult<()> {
        if !self.may_need_sync {
            return self.consumer.on_frame_ready(buffer, settings, status);
        }

        let item = self.items().get(&buffer.id()).cloned();
        let item = match item {
            Some(item) => item,
            None => return self.consumer.on_frame_ready(buffer, settings, status),
        };

        if !item.record(&buffer, (Arc::clone(&settings), status.clone())) {
            return self.consumer.on_frame_ready(buffer, settings, status);
        }

        if item.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return Ok(());
        }
        self.release(&item, (settings, Err(PipelineError::Flushed)))
    }

    /// Release every pending sync item. Outputs not yet released carry [`PipelineError::Flushed`].
    pub fn flush(&self) -> PipelineResult<()> {
        let pending: Vec<Arc<SyncItem>> = {
            let mut items = self.items();
            let mut pending: Vec<Arc<SyncItem>> = Vec::new();
            for (_, item) in items.drain() {
                if !pending.iter().any(|p| Arc::ptr_eq(p, &item)) {
                    pending.push(item);
                }
            }
            pending
        };
        if !pending.is_empty() {
            tracing::info!("Flushing {} pending sync items", pending.len());
        }

        let fallback_settings = Arc::new(ProcessingSettings::default());
        pending.iter().fold(Ok(()), |acc, item| {
            let fallback = (Arc::clone(&fallback_settings), Err(PipelineError::Flushed));
            combine_status(acc, self.release(item, fallback))
        })
    }

    /// Forward every output of `item` once and drop its table entries.
    fn release(&self, item: &Arc<SyncItem>, fallback: Release) -> PipelineResult<()> {
        if item.forwarded.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        {
            let mut items = self.items();
            items.retain(|_, v| !Arc::ptr_eq(v, item));
        }
        item.drain(&fallback)
            .into_iter()
            .fold(Ok(()), |acc, (buffer, (settings, status))| {
                combine_status(acc, self.consumer.on_frame_ready(buffer, settings, status))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bridge::{ChannelConsumer, MockFrameConsumer};
    use crate::pipeline::buffer::FrameBuffer;
    use crate::pipeline::id::StreamId;
    use crate::types::FrameDescriptor;

    fn frame() -> Arc<FrameBuffer> {
        Arc::new(FrameBuffer::new(FrameDescriptor::nv12(4, 4)))
    }

    fn settings() -> Arc<ProcessingSettings> {
        ProcessingSettings::for_request(1).shared()
    }

    #[test]
    fn test_single_stream_forwards_immediately() {
        let mut consumer = MockFrameConsumer::new();
        consumer.expect_on_frame_ready().times(1).returning(|_, _, _| Ok(()));
        let join = OutputJoin::new(Arc::new(consumer), false);
        let input = ProcBuffer::wrap(frame());
        assert!(!join.register_potential_sync(&input, &[input.clone()]));
        join.notify(input, settings(), Ok(())).unwrap();
    }

    #[test]
    fn test_distinct_outputs_create_no_item() {
        let (consumer, rx) = ChannelConsumer::new();
        let join = OutputJoin::new(Arc::new(consumer), true);
        let input = ProcBuffer::wrap(frame());
        let a = ProcBuffer::for_stream(frame(), StreamId(1));
        let b = ProcBuffer::for_stream(frame(), StreamId(2));
        assert!(!join.register_potential_sync(&input, &[a.clone(), b.clone()]));
        join.notify(a, settings(), Ok(())).unwrap();
        assert_eq!(rx.drain().len(), 1);
        join.notify(b, settings(), Ok(())).unwrap();
        assert_eq!(rx.drain().len(), 1);
    }

    #[test]
    fn test_shared_buffer_held_until_last_release() {
        let (consumer, rx) = ChannelConsumer::new();
        let join = OutputJoin::new(Arc::new(consumer), true);
        let input_frame = frame();
        let input = ProcBuffer::wrap(Arc::clone(&input_frame));
        let aliased = ProcBuffer::for_stream(Arc::clone(&input_frame), StreamId(1));
        let scaled = ProcBuffer::for_stream(frame(), StreamId(2));

        assert!(join.register_potential_sync(&input, &[aliased.clone(), scaled.clone()]));
        assert_eq!(join.pending_items(), 1);

        join.notify(aliased, settings(), Ok(())).unwrap();
        assert!(rx.is_empty());

        join.notify(scaled, settings(), Err(PipelineError::ProcessingFailed("x".into())))
            .unwrap();
        let frames = rx.drain();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].stream(), Some(StreamId(1)));
        assert!(frames[0].is_ok());
        assert_eq!(frames[1].stream(), Some(StreamId(2)));
        assert!(!frames[1].is_ok());
        assert_eq!(join.pending_items(), 0);
    }

    #[test]
    fn test_release_order_does_not_matter() {
        let (consumer, rx) = ChannelConsumer::new();
        let join = OutputJoin::new(Arc::new(consumer), true);
        let input_frame = frame();
        let input = ProcBuffer::wrap(Arc::clone(&input_frame));
        let aliased = ProcBuffer::for_stream(Arc::clone(&input_frame), StreamId(1));
        let scaled = ProcBuffer::for_stream(frame(), StreamId(2));
        join.register_potential_sync(&input, &[aliased.clone(), scaled.clone()]);

        join.notify(scaled, settings(), Ok(())).unwrap();
        assert!(rx.is_empty());
        join.notify(aliased, settings(), Ok(())).unwrap();
        assert_eq!(rx.drain().len(), 2);
    }

    #[test]
    fn test_flush_releases_pending_once() {
        let (consumer, rx) = ChannelConsumer::new();
        let join = OutputJoin::new(Arc::new(consumer), true);
        let input_frame = frame();
        let input = ProcBuffer::wrap(Arc::clone(&input_frame));
        let aliased = ProcBuffer::for_stream(Arc::clone(&input_frame), StreamId(1));
        let scaled = ProcBuffer::for_stream(frame(), StreamId(2));
        join.register_potential_sync(&input, &[aliased.clone(), scaled]);
        join.notify(aliased, settings(), Ok(())).unwrap();

        join.flush().unwrap();
        let frames = rx.drain();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert_eq!(frames[1].status, Err(PipelineError::Flushed));

        join.flush().unwrap();
        assert!(rx.is_empty());
    }

    #[test]
    fn test_consumer_errors_are_combined() {
        let mut consumer = MockFrameConsumer::new();
        consumer
            .expect_on_frame_ready()
            .times(2)
            .returning(|_, _, _| Err(PipelineError::ProcessingFailed("consumer gone".into())));
        let join = OutputJoin::new(Arc::new(consumer), true);
        let input_frame = frame();
        let input = ProcBuffer::wrap(Arc::clone(&input_frame));
        let aliased = ProcBuffer::for_stream(Arc::clone(&input_frame), StreamId(1));
        let scaled = ProcBuffer::for_stream(frame(), StreamId(2));
        join.register_potential_sync(&input, &[aliased.clone(), scaled.clone()]);
        join.notify(aliased, settings(), Ok(())).unwrap();
        assert!(join.notify(scaled, settings(), Ok(())).is_err());
    }
}
