//! Transfer request assembly
//!
//! A [`TransferBatchRequest`] carries the three categorized buffer
//! collections of a batch to the transport layer. Collections are kept
//! separate, in arrival order, because the receiver decodes each category
//! differently.
//!
//! Encoding uses postcard:
//!
//! ```text
//! [binary_buffers][insert_node_buffers][tablet_buffers]
//!  each: varint count, then (varint len, bytes) per buffer
//! ```

use crate::common::serde_utils::vec_bytes_serde;
use crate::common::{CategorizedBuffers, PipeError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Largest encoded request accepted by [`TransferBatchRequest::from_bytes`]
/// and produced by [`TransferBatchRequest::to_bytes`] (256 MiB).
pub const MAX_REQUEST_SIZE: usize = 256 * 1024 * 1024;

/// Wire-ready payload of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBatchRequest {
    /// Raw passthrough buffers from the source log
    #[serde(with = "vec_bytes_serde")]
    pub binary_buffers: Vec<Bytes>,
    /// Pre-serialized insert nodes
    #[serde(with = "vec_bytes_serde")]
    pub insert_node_buffers: Vec<Bytes>,
    /// Freshly serialized tablets, each ending with its aligned flag
    #[serde(with = "vec_bytes_serde")]
    pub tablet_buffers: Vec<Bytes>,
}

impl TransferBatchRequest {
    pub fn from_buffers(
        binary_buffers: Vec<Bytes>,
        insert_node_buffers: Vec<Bytes>,
        tablet_buffers: Vec<Bytes>,
    ) -> Self {
        Self {
            binary_buffers,
            insert_node_buffers,
            tablet_buffers,
        }
    }

    /// Build a request from a batch's collections.
    ///
    /// `Bytes` clones share storage, so this does not copy payloads.
    pub fn from_categorized(buffers: &CategorizedBuffers) -> Self {
        Self::from_buffers(
            buffers.binary.clone(),
            buffers.insert_node.clone(),
            buffers.tablet.clone(),
        )
    }

    /// True if no collection holds a buffer.
    pub fn is_empty(&self) -> bool {
        self.buffer_count() == 0
    }

    pub fn buffer_count(&self) -> usize {
        self.binary_buffers.len() + self.insert_node_buffers.len() + self.tablet_buffers.len()
    }

    /// Payload bytes across all collections, excluding framing.
    pub fn total_bytes(&self) -> usize {
        self.binary_buffers
            .iter()
            .chain(&self.insert_node_buffers)
            .chain(&self.tablet_buffers)
            .map(Bytes::len)
            .sum()
    }

    /// Serialize request to bytes (postcard format)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let encoded = postcard::to_allocvec(self)?;
        if encoded.len() > MAX_REQUEST_SIZE {
            return Err(PipeError::MessageTooLarge(encoded.len(), MAX_REQUEST_SIZE));
        }
        Ok(encoded)
    }

    /// Deserialize request from bytes (postcard format)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_REQUEST_SIZE {
            return Err(PipeError::MessageTooLarge(data.len(), MAX_REQUEST_SIZE));
        }
        postcard::from_bytes(data).map_err(|e| PipeError::Deserialization(e.to_string()))
    }
}
