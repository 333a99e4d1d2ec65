//! # Pipe Batch Accumulation
//!
//! Accumulates mutation events for one downstream connection and decides
//! when the batch has to be sent.
//!
//! ## Flush triggers
//!
//! - **Size**: buffered bytes reach the current memory budget
//! - **Delay**: the oldest event in the batch has waited `max_delay`
//!
//! The size limit is read live from an elastic [`MemoryBlock`], so it can
//! shrink or grow between two calls.
//!
//! ## Lifecycle
//!
//! ```text
//!            intake()* ──▶ flush required? ──▶ assemble_request() ──▶ send
//!               ▲                                                     │
//!               └──────────────── success_reset() ◀───────────────────┘
//!
//!            close() ──▶ references released, budget returned (terminal)
//! ```
//!
//! A failed send is retried by feeding the same events again; an event equal
//! to the last appended one is not appended twice.
//!
//! ## Usage
//!
//! ```ignore
//! use rivven_pipe::{BatchAccumulator, BatchConfig, ElasticMemoryManager};
//!
//! let governor = ElasticMemoryManager::new(64 * 1024 * 1024);
//! let batch = BatchAccumulator::new(BatchConfig::default(), &governor)?;
//!
//! if batch.intake(event)? {
//!     transport.send(batch.assemble_request())?;
//!     batch.success_reset();
//! }
//! ```

use crate::common::{
    BatchConfig, BatchStats, CategorizedBuffers, ElasticPolicy, EventEncoder, MemoryBlock,
    MemoryGovernor, PipeError, PipeEvent, Result, TransferBatchRequest, BATCH_HOLDER,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Batch accumulator for one downstream connection.
///
/// `intake`, `success_reset` and `close` are serialized by a single lock.
/// Read accessors take the same lock briefly, except `is_closed`.
pub struct BatchAccumulator<E: PipeEvent> {
    max_delay: Duration,
    requested_batch_size: u64,
    memory_block: Arc<dyn MemoryBlock>,
    state: Mutex<BatchState<E>>,
    closed: AtomicBool,
    stats: Arc<BatchStats>,
}

struct BatchState<E> {
    events: Vec<Arc<E>>,
    /// Index-aligned with `events`
    commit_ids: Vec<u64>,
    buffers: CategorizedBuffers,
    /// Sum of all buffer lengths in `buffers`
    total_buffer_size: u64,
    /// Unset while the batch is empty
    first_event_processing_time: Option<Instant>,
}

impl<E> BatchState<E> {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            commit_ids: Vec::new(),
            buffers: CategorizedBuffers::new(),
            total_buffer_size: 0,
            first_event_processing_time: None,
        }
    }

    fn clear(&mut self) {
        self.buffers.clear();
        self.events.clear();
        self.commit_ids.clear();
        self.first_event_processing_time = None;
        self.total_buffer_size = 0;
    }
}

impl<E: PipeEvent> BatchAccumulator<E> {
    /// Create an accumulator, allocating its batch budget from `governor`.
    ///
    /// A smaller grant than requested is not an error; the accumulator works
    /// with what it gets.
    pub fn new<G>(config: BatchConfig, governor: &G) -> Result<Self>
    where
        G: MemoryGovernor + ?Sized,
    {
        let config = config.validated()?;
        let requested = config.max_batch_size_bytes;

        let memory_block = governor.try_allocate(requested);
        memory_block.set_elastic_policy(
            ElasticPolicy::halve_and_double(requested)
                .on_shrink(|old, new| {
                    info!("The batch size limit has shrunk from {} to {}", old, new);
                })
                .on_expand(|old, new| {
                    info!("The batch size limit has expanded from {} to {}", old, new);
                }),
        );

        let granted = memory_block.memory_usage_in_bytes();
        if granted != requested {
            info!(
                "Max batch size adjusted from {} to {} due to memory restriction",
                requested, granted
            );
        }

        Ok(Self {
            max_delay: config.max_delay(),
            requested_batch_size: requested,
            memory_block,
            state: Mutex::new(BatchState::new()),
            closed: AtomicBool::new(false),
            stats: Arc::new(BatchStats::new()),
        })
    }

    /// Create an accumulator from flat connector parameters.
    pub fn from_parameters<G>(parameters: &HashMap<String, String>, governor: &G) -> Result<Self>
    where
        G: MemoryGovernor + ?Sized,
    {
        Self::new(BatchConfig::from_parameters(parameters)?, governor)
    }

    /// Offer an event to the batch.
    ///
    /// Returns `true` if the batch should be sent now. The trigger is
    /// evaluated on every call, including calls that appended nothing.
    ///
    /// An event equal to the most recently appended one is not appended
    /// again. An event whose reference cannot be taken is logged and dropped.
    ///
    /// # Errors
    ///
    /// - [`PipeError::Closed`] after [`close`](Self::close)
    /// - an encoding failure (see [`PipeError::is_encoding_failure`]); the
    ///   event was not appended and its reference was given back
    pub fn intake(&self, event: Arc<E>) -> Result<bool> {
        let mut state = self.state.lock();

        if self.closed.load(Ordering::Acquire) {
            warn!(
                "Rejecting event {} offered to a closed batch",
                event.report_message()
            );
            return Err(PipeError::Closed);
        }

        let is_retry = state
            .events
            .last()
            .is_some_and(|last| Arc::ptr_eq(last, &event) || **last == *event);

        if is_retry {
            self.stats.record_duplicate();
            debug!(
                "Event with commit id {} is already the last one in the batch, skipping",
                event.commit_id()
            );
        } else if event.increase_reference_count(BATCH_HOLDER) {
            match EventEncoder::encode_into(event.as_ref(), &mut state.buffers) {
                Ok((category, size)) => {
                    state.commit_ids.push(event.commit_id());
                    state.events.push(event);
                    state.total_buffer_size += size as u64;
                    if state.first_event_processing_time.is_none() {
                        state.first_event_processing_time = Some(Instant::now());
                    }
                    self.stats.record_accepted(category, size);
                }
                Err(e) => {
                    if !event.decrease_reference_count(BATCH_HOLDER) {
                        warn!(
                            "Failed to give back reference of event {} after encoding error",
                            event.report_message()
                        );
                    }
                    self.stats.record_encoding_failure();
                    warn!("Failed to encode event {}: {}", event.report_message(), e);
                    return Err(e);
                }
            }
        } else {
            self.stats.record_retain_failure();
            error!(
                "Event {} can not be transferred because the reference count can not be increased, the data represented by this event is lost",
                event.report_message()
            );
        }

        Ok(self.should_flush(&state))
    }

    fn should_flush(&self, state: &BatchState<E>) -> bool {
        state.total_buffer_size >= self.max_batch_size_in_bytes()
            || state
                .first_event_processing_time
                .is_some_and(|first| first.elapsed() >= self.max_delay)
    }

    /// Drop the batch after the transport confirmed delivery.
    ///
    /// References are not released here: ownership of sent events moved to
    /// the acknowledgment path. The memory budget is left as is.
    pub fn success_reset(&self) {
        let mut state = self.state.lock();
        let sent = state.events.len();
        state.clear();
        self.stats.record_batch_sent();
        debug!("Batch of {} events acknowledged, accumulator reset", sent);
    }

    /// Build the transfer request for the current batch.
    ///
    /// Empty batches produce an empty request.
    pub fn assemble_request(&self) -> TransferBatchRequest {
        let state = self.state.lock();
        TransferBatchRequest::from_categorized(&state.buffers)
    }

    /// True if no buffer is held.
    pub fn is_empty(&self) -> bool {
        self.state.lock().buffers.is_empty()
    }

    /// Number of events in the batch.
    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    /// Copy of the retained events, in arrival order.
    pub fn snapshot_events(&self) -> Vec<Arc<E>> {
        self.state.lock().events.clone()
    }

    /// Copy of the commit ids, index-aligned with [`snapshot_events`](Self::snapshot_events).
    pub fn commit_ids(&self) -> Vec<u64> {
        self.state.lock().commit_ids.clone()
    }

    /// Bytes currently buffered across all categories.
    pub fn total_buffer_size(&self) -> u64 {
        self.state.lock().total_buffer_size
    }

    /// Current batch size limit as granted by the governor.
    #[inline]
    pub fn max_batch_size_in_bytes(&self) -> u64 {
        self.memory_block.memory_usage_in_bytes()
    }

    /// Batch size limit originally requested.
    pub fn requested_batch_size(&self) -> u64 {
        self.requested_batch_size
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn stats(&self) -> &Arc<BatchStats> {
        &self.stats
    }

    /// Shut down: release every retained reference once and return the
    /// memory budget. Repeated calls do nothing.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let events = std::mem::take(&mut state.events);
        for event in &events {
            if !event.decrease_reference_count(BATCH_HOLDER) {
                warn!(
                    "Failed to release reference of event {} on close",
                    event.report_message()
                );
            }
        }
        state.clear();
        self.stats.record_released(events.len());

        self.memory_block.close();
        info!(
            "Batch accumulator closed, released {} retained events",
            events.len()
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<E: PipeEvent> Drop for BatchAccumulator<E> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<E: PipeEvent> fmt::Debug for BatchAccumulator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchAccumulator")
            .field("max_delay", &self.max_delay)
            .field("requested_batch_size", &self.requested_batch_size)
            .field("max_batch_size", &self.max_batch_size_in_bytes())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
