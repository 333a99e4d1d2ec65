//! # Common Pipe Batching Types
//!
//! - [`BatchAccumulator`] - Batch state, flush decisions, lifecycle
//! - [`EventEncoder`] - Cheapest byte representation per event
//! - [`MemoryGovernor`] / [`MemoryBlock`] - Elastic batch budget
//! - [`ElasticMemoryManager`] - In-process governor
//! - [`TransferBatchRequest`] - Three buffer collections for the transport
//! - [`PipeEvent`] - Capabilities required from a mutation event
//! - [`BatchConfig`] - Size and delay limits
//! - [`BatchStats`] - Intake counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Common Module                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PipeEvent        ←─── implemented by the event model       │
//! │  EventEncoder     ←─── binary / insert node / tablet        │
//! │  BatchAccumulator ←─── intake, reset, close                 │
//! │  MemoryBlock      ←─── live size limit from the governor    │
//! │  Request          ←─── hands buffers to the transport       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod batch;
mod config;
mod encoder;
mod error;
mod event;
mod memory;
mod metrics;
mod request;
pub mod serde_utils;

pub use batch::*;
pub use config::*;
pub use encoder::*;
pub use error::*;
pub use event::*;
pub use memory::*;
pub use metrics::*;
pub use request::*;
