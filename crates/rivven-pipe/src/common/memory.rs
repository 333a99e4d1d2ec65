//! # Elastic Memory Budget
//!
//! The batch size limit is not a constant: it is a grant from a process-wide
//! memory governor that may shrink it under pressure and grow it back when
//! memory frees up.
//!
//! ```text
//! ┌────────────────────┐  try_allocate(bytes)   ┌──────────────────────┐
//! │  BatchAccumulator  │ ─────────────────────▶ │    MemoryGovernor     │
//! │                    │ ◀───────────────────── │                      │
//! │ reads usage live   │   Arc<dyn MemoryBlock> │ shrink_all/expand_all │
//! └────────────────────┘                        └──────────┬───────────┘
//!                                                          │ applies
//!                                              ┌───────────▼───────────┐
//!                                              │     ElasticPolicy      │
//!                                              │ shrink(old) -> new     │
//!                                              │ expand(old) -> new     │
//!                                              │ on_shrink/on_expand    │
//!                                              └───────────────────────┘
//! ```
//!
//! Policies and callbacks are plain closures supplied by the block holder.
//! They run on whatever thread drives the governor and must not call back
//! into the holder's locked state.
//!
//! [`ElasticMemoryManager`] is an in-process governor with a fixed capacity.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Computes a new budget from the current one.
pub type ResizeMethod = Box<dyn Fn(u64) -> u64 + Send + Sync>;

/// Notified with `(old, new)` after a resize took effect.
pub type ResizeCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Shrink/expand behavior of a memory block.
pub struct ElasticPolicy {
    shrink_method: ResizeMethod,
    shrink_callback: Option<ResizeCallback>,
    expand_method: ResizeMethod,
    expand_callback: Option<ResizeCallback>,
}

impl Default for ElasticPolicy {
    /// A policy that never changes the budget.
    fn default() -> Self {
        Self::new(|old| old, |old| old)
    }
}

impl ElasticPolicy {
    /// Create a policy from shrink and expand methods.
    pub fn new(
        shrink: impl Fn(u64) -> u64 + Send + Sync + 'static,
        expand: impl Fn(u64) -> u64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            shrink_method: Box::new(shrink),
            shrink_callback: None,
            expand_method: Box::new(expand),
            expand_callback: None,
        }
    }

    /// Halve on shrink (floor 0), double on expand up to `cap`.
    ///
    /// Expanding from zero starts at one byte so a fully shrunk budget can
    /// recover.
    pub fn halve_and_double(cap: u64) -> Self {
        Self::new(
            |old| old / 2,
            move |old| old.max(1).saturating_mul(2).min(cap),
        )
    }

    /// Set the shrink notification.
    pub fn on_shrink(mut self, callback: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.shrink_callback = Some(Box::new(callback));
        self
    }

    /// Set the expand notification.
    pub fn on_expand(mut self, callback: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.expand_callback = Some(Box::new(callback));
        self
    }

    /// Apply the shrink method.
    pub fn shrink(&self, old: u64) -> u64 {
        (self.shrink_method)(old)
    }

    /// Apply the expand method.
    pub fn expand(&self, old: u64) -> u64 {
        (self.expand_method)(old)
    }

    pub fn notify_shrink(&self, old: u64, new: u64) {
        if let Some(callback) = &self.shrink_callback {
            callback(old, new);
        }
    }

    pub fn notify_expand(&self, old: u64, new: u64) {
        if let Some(callback) = &self.expand_callback {
            callback(old, new);
        }
    }
}

impl fmt::Debug for ElasticPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticPolicy")
            .field("shrink_callback", &self.shrink_callback.is_some())
            .field("expand_callback", &self.expand_callback.is_some())
            .finish_non_exhaustive()
    }
}

/// A budget granted by a [`MemoryGovernor`].
pub trait MemoryBlock: Send + Sync {
    /// Current size of the grant. May change between calls.
    fn memory_usage_in_bytes(&self) -> u64;

    /// Install the policy the governor applies under pressure.
    fn set_elastic_policy(&self, policy: ElasticPolicy);

    /// Return the budget to the governor.
    fn close(&self);

    /// Whether [`close`](MemoryBlock::close) has taken effect.
    fn is_released(&self) -> bool;
}

/// Source of memory budgets.
pub trait MemoryGovernor: Send + Sync {
    /// Request a budget. Under pressure the grant may be smaller than
    /// requested, possibly zero.
    fn try_allocate(&self, requested_bytes: u64) -> Arc<dyn MemoryBlock>;
}

// ============================================================================
// In-process governor
// ============================================================================

struct ManagerInner {
    capacity: u64,
    used: AtomicU64,
    blocks: Mutex<Vec<Weak<ElasticBlock>>>,
}

impl ManagerInner {
    fn free(&self) -> u64 {
        self.capacity.saturating_sub(self.used.load(Ordering::Acquire))
    }

    /// Reserve up to `want` bytes, returning how many were reserved.
    fn reserve(&self, want: u64) -> u64 {
        let mut granted = 0;
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                granted = want.min(self.capacity.saturating_sub(used));
                Some(used + granted)
            });
        granted
    }

    fn give_back(&self, bytes: u64) {
        if bytes > 0 {
            self.used.fetch_sub(bytes, Ordering::AcqRel);
        }
    }
}

/// Fixed-capacity governor handing out [`ElasticBlock`]s.
#[derive(Clone)]
pub struct ElasticMemoryManager {
    inner: Arc<ManagerInner>,
}

impl ElasticMemoryManager {
    /// Create a governor with `capacity` bytes to hand out.
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                capacity,
                used: AtomicU64::new(0),
                blocks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Total capacity.
    pub fn capacity(&self) -> u64 {
        self.inner.capacity
    }

    /// Bytes currently granted to open blocks.
    pub fn used(&self) -> u64 {
        self.inner.used.load(Ordering::Acquire)
    }

    /// Bytes not granted to anyone.
    pub fn free(&self) -> u64 {
        self.inner.free()
    }

    /// Allocate a concrete block.
    pub fn allocate(&self, requested_bytes: u64) -> Arc<ElasticBlock> {
        let granted = self.inner.reserve(requested_bytes);
        let block = Arc::new(ElasticBlock {
            manager: Arc::downgrade(&self.inner),
            state: Mutex::new(BlockState {
                usage: granted,
                released: false,
                policy: Arc::new(ElasticPolicy::default()),
            }),
        });

        let mut blocks = self.inner.blocks.lock();
        blocks.retain(|b| b.strong_count() > 0);
        blocks.push(Arc::downgrade(&block));

        debug!(
            "Allocated memory block: requested={}, granted={}",
            requested_bytes, granted
        );
        block
    }

    /// Apply every open block's shrink policy. Returns how many changed.
    pub fn shrink_all(&self) -> usize {
        let mut changed = 0;
        for block in self.live_blocks() {
            if block.shrink() {
                changed += 1;
            }
        }
        changed
    }

    /// Apply every open block's expand policy, bounded by free capacity.
    /// Returns how many changed.
    pub fn expand_all(&self) -> usize {
        let mut changed = 0;
        for block in self.live_blocks() {
            if block.expand() {
                changed += 1;
            }
        }
        changed
    }

    fn live_blocks(&self) -> Vec<Arc<ElasticBlock>> {
        let mut blocks = self.inner.blocks.lock();
        blocks.retain(|b| b.strong_count() > 0);
        blocks.iter().filter_map(Weak::upgrade).collect()
    }
}

impl MemoryGovernor for ElasticMemoryManager {
    fn try_allocate(&self, requested_bytes: u64) -> Arc<dyn MemoryBlock> {
        self.allocate(requested_bytes)
    }
}

impl fmt::Debug for ElasticMemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticMemoryManager")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .finish()
    }
}

struct BlockState {
    usage: u64,
    released: bool,
    policy: Arc<ElasticPolicy>,
}

/// Block handed out by [`ElasticMemoryManager`].
pub struct ElasticBlock {
    manager: Weak<ManagerInner>,
    state: Mutex<BlockState>,
}

impl ElasticBlock {
    fn shrink(&self) -> bool {
        let (policy, old, new) = {
            let mut state = self.state.lock();
            if state.released {
                return false;
            }
            let old = state.usage;
            let new = state.policy.shrink(old).min(old);
            if new == old {
                return false;
            }
            state.usage = new;
            if let Some(manager) = self.manager.upgrade() {
                manager.give_back(old - new);
            }
            (Arc::clone(&state.policy), old, new)
        };

        policy.notify_shrink(old, new);
        true
    }

    fn expand(&self) -> bool {
        let Some(manager) = self.manager.upgrade() else {
            return false;
        };

        let (policy, old, new) = {
            let mut state = self.state.lock();
            if state.released {
                return false;
            }
            let old = state.usage;
            let target = state.policy.expand(old).max(old);
            let granted = manager.reserve(target - old);
            if granted == 0 {
                return false;
            }
            state.usage = old + granted;
            (Arc::clone(&state.policy), old, old + granted)
        };

        policy.notify_expand(old, new);
        true
    }
}

impl MemoryBlock for ElasticBlock {
    fn memory_usage_in_bytes(&self) -> u64 {
        self.state.lock().usage
    }

    fn set_elastic_policy(&self, policy: ElasticPolicy) {
        self.state.lock().policy = Arc::new(policy);
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if state.released {
            return;
        }
        state.released = true;
        let bytes = std::mem::take(&mut state.usage);
        if let Some(manager) = self.manager.upgrade() {
            manager.give_back(bytes);
        }
    }

    fn is_released(&self) -> bool {
        self.state.lock().released
    }
}

impl Drop for ElasticBlock {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.released {
            if let Some(manager) = self.manager.upgrade() {
                manager.give_back(state.usage);
            }
        }
    }
}

impl fmt::Debug for ElasticBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ElasticBlock")
            .field("usage", &state.usage)
            .field("released", &state.released)
            .finish()
    }
}
