//! # rivven-pipe - Batching for Rivven pipe connectors
//!
//! Accumulates mutation events bound for one downstream receiver, picks the
//! cheapest byte representation for each, and decides when the batch must be
//! flushed.
//!
//! ## Architecture
//!
//! ```text
//!   upstream pipeline
//!         │ intake(event)
//!         ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                   BatchAccumulator                       │
//! │  events + commit ids │ binary │ insert node │ tablet      │
//! │  total bytes ≥ budget?  oldest event ≥ max delay?        │
//! └──────────┬───────────────────────────────┬───────────────┘
//!            │ assemble_request()            │ live size limit
//!            ▼                               ▼
//!   TransferBatchRequest             MemoryBlock (governor)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rivven_pipe::{BatchAccumulator, BatchConfig, ElasticMemoryManager};
//!
//! let governor = ElasticMemoryManager::new(256 * 1024 * 1024);
//! let batch = BatchAccumulator::new(BatchConfig::default(), &governor)?;
//!
//! for event in events {
//!     if batch.intake(event)? {
//!         let request = batch.assemble_request();
//!         transport.send(request.to_bytes()?)?;
//!         batch.success_reset();
//!     }
//! }
//! batch.close();
//! ```
//!
//! ## Public API Organization
//!
//! ### Tier 1: Core Types (crate root)
//! `BatchAccumulator`, `BatchConfig`, `PipeEvent`, `EventPayload`,
//! `TransferBatchRequest`, `PipeError`.
//!
//! ### Tier 2: Memory governance (crate root)
//! `MemoryGovernor`, `MemoryBlock`, `ElasticPolicy`, `ElasticMemoryManager`.
//!
//! ### Tier 3: Advanced Types (`common` module)
//! Encoder internals, serde helpers, statistics.

pub mod common;

// =============================================================================
// TIER 1: Core Types
// =============================================================================

pub use common::{
    BatchAccumulator, BatchConfig, BufferCategory, ErrorCategory, EventPayload, PipeError,
    PipeEvent, Result, TransferBatchRequest, WireSerialize, BATCH_HOLDER,
};

// =============================================================================
// TIER 2: Memory Governance
// =============================================================================

pub use common::{ElasticBlock, ElasticMemoryManager, ElasticPolicy, MemoryBlock, MemoryGovernor};
