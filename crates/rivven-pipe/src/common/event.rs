//! Pipe event capability surface
//!
//! The mutation-event model lives outside this crate. The accumulator only
//! needs a handful of capabilities from an event:
//!
//! - a commit id for acknowledgment correlation
//! - reference counting so the underlying data is not reclaimed while batched
//! - equality, used to suppress adjacent resubmissions on retry
//! - one of three byte representations, resolved once per event
//!
//! ```text
//! ┌───────────────┐  payload()  ┌──────────────────────────────┐
//! │   PipeEvent   │ ──────────▶ │ EventPayload                 │
//! └───────────────┘             │  Binary(Bytes)      (WAL hit) │
//!                               │  InsertNode(..)  (structured) │
//!                               │  Tablet { .., aligned }       │
//!                               └──────────────────────────────┘
//! ```

use crate::common::Result;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Holder name the accumulator uses when taking and dropping references.
pub const BATCH_HOLDER: &str = "rivven_pipe::BatchAccumulator";

/// An object that can write its native encoding into a buffer.
///
/// Implemented for every `serde::Serialize` type using postcard, which is
/// how structured insert nodes and canonical tablets are encoded.
pub trait WireSerialize: Send + Sync {
    /// Append the encoding of `self` to `out`.
    fn serialize_into(&self, out: &mut BytesMut) -> Result<()>;
}

impl<T> WireSerialize for T
where
    T: Serialize + Send + Sync,
{
    fn serialize_into(&self, out: &mut BytesMut) -> Result<()> {
        let encoded = postcard::to_allocvec(self)?;
        out.reserve(encoded.len());
        out.put_slice(&encoded);
        Ok(())
    }
}

/// The cheapest representation an event can currently offer.
#[derive(Clone)]
pub enum EventPayload {
    /// Bytes still cached from the source log, forwarded verbatim
    Binary(Bytes),
    /// Structured insert node that serializes directly into its native form
    InsertNode(Arc<dyn WireSerialize>),
    /// Generic row values converted to a canonical tablet
    Tablet {
        tablet: Arc<dyn WireSerialize>,
        /// Storage-layout hint the receiver needs to decode the tablet
        aligned: bool,
    },
}

impl EventPayload {
    /// Short name of the representation, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Binary(_) => "binary",
            Self::InsertNode(_) => "insert_node",
            Self::Tablet { .. } => "tablet",
        }
    }
}

impl fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary(bytes) => f.debug_tuple("Binary").field(&bytes.len()).finish(),
            Self::InsertNode(_) => f.write_str("InsertNode(..)"),
            Self::Tablet { aligned, .. } => f
                .debug_struct("Tablet")
                .field("aligned", aligned)
                .finish_non_exhaustive(),
        }
    }
}

/// Capabilities the accumulator requires from a mutation event.
///
/// Equality is defined by the implementor; the accumulator only compares an
/// incoming event against the most recently appended one.
pub trait PipeEvent: PartialEq + fmt::Debug + Send + Sync {
    /// Position of this event in the upstream commit sequence.
    fn commit_id(&self) -> u64;

    /// Take a reference on behalf of `holder`.
    ///
    /// Returns false if the event can no longer be retained (its data has
    /// already been reclaimed).
    fn increase_reference_count(&self, holder: &str) -> bool;

    /// Drop a reference previously taken by `holder`.
    fn decrease_reference_count(&self, holder: &str) -> bool;

    /// Diagnostic description used when the event is lost.
    fn report_message(&self) -> String;

    /// Resolve the representation to batch.
    ///
    /// Only called while the accumulator holds a reference.
    fn payload(&self) -> Result<EventPayload>;
}
