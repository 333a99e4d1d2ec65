//! # Event Encoding
//!
//! Picks the cheapest valid byte representation for an event:
//!
//! | Payload       | Work done                          | Category     |
//! |---------------|------------------------------------|--------------|
//! | `Binary`      | none, WAL bytes forwarded verbatim | `Binary`     |
//! | `InsertNode`  | direct serialization               | `InsertNode` |
//! | `Tablet`      | serialization + aligned flag byte  | `Tablet`     |
//!
//! A buffer is only pushed into [`CategorizedBuffers`] once it is fully
//! built, so a failed encode leaves the collections untouched.

use crate::common::{EventPayload, PipeEvent, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Initial scratch capacity for serialized payloads.
const ENCODE_BUFFER_CAPACITY: usize = 256;

/// Which collection a buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferCategory {
    /// Raw passthrough bytes from the source log
    Binary,
    /// Pre-serialized structured insert node
    InsertNode,
    /// Freshly serialized canonical tablet with trailing aligned flag
    Tablet,
}

impl BufferCategory {
    pub const ALL: [BufferCategory; 3] = [Self::Binary, Self::InsertNode, Self::Tablet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::InsertNode => "insert_node",
            Self::Tablet => "tablet",
        }
    }
}

impl fmt::Display for BufferCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully encoded event buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBuffer {
    pub category: BufferCategory,
    pub bytes: Bytes,
}

impl EncodedBuffer {
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The three ordered buffer collections of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorizedBuffers {
    pub binary: Vec<Bytes>,
    pub insert_node: Vec<Bytes>,
    pub tablet: Vec<Bytes>,
}

impl CategorizedBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a buffer to its collection.
    pub fn push(&mut self, buffer: EncodedBuffer) {
        self.collection_mut(buffer.category).push(buffer.bytes);
    }

    /// Buffers of one category, in arrival order.
    pub fn get(&self, category: BufferCategory) -> &[Bytes] {
        match category {
            BufferCategory::Binary => &self.binary,
            BufferCategory::InsertNode => &self.insert_node,
            BufferCategory::Tablet => &self.tablet,
        }
    }

    fn collection_mut(&mut self, category: BufferCategory) -> &mut Vec<Bytes> {
        match category {
            BufferCategory::Binary => &mut self.binary,
            BufferCategory::InsertNode => &mut self.insert_node,
            BufferCategory::Tablet => &mut self.tablet,
        }
    }

    /// True if all three collections are empty.
    pub fn is_empty(&self) -> bool {
        self.binary.is_empty() && self.insert_node.is_empty() && self.tablet.is_empty()
    }

    /// Number of buffers across all collections.
    pub fn len(&self) -> usize {
        self.binary.len() + self.insert_node.len() + self.tablet.len()
    }

    /// Sum of every buffer length across all collections.
    pub fn total_bytes(&self) -> usize {
        BufferCategory::ALL
            .iter()
            .flat_map(|c| self.get(*c))
            .map(Bytes::len)
            .sum()
    }

    pub fn clear(&mut self) {
        self.binary.clear();
        self.insert_node.clear();
        self.tablet.clear();
    }
}

/// Encodes events into categorized buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventEncoder;

impl EventEncoder {
    /// Encode a resolved payload.
    pub fn encode(payload: EventPayload) -> Result<EncodedBuffer> {
        match payload {
            EventPayload::Binary(bytes) => Ok(EncodedBuffer {
                category: BufferCategory::Binary,
                bytes,
            }),
            EventPayload::InsertNode(node) => {
                let mut out = BytesMut::with_capacity(ENCODE_BUFFER_CAPACITY);
                node.serialize_into(&mut out)?;
                Ok(EncodedBuffer {
                    category: BufferCategory::InsertNode,
                    bytes: out.freeze(),
                })
            }
            EventPayload::Tablet { tablet, aligned } => {
                let mut out = BytesMut::with_capacity(ENCODE_BUFFER_CAPACITY);
                tablet.serialize_into(&mut out)?;
                out.put_u8(u8::from(aligned));
                Ok(EncodedBuffer {
                    category: BufferCategory::Tablet,
                    bytes: out.freeze(),
                })
            }
        }
    }

    /// Resolve and encode an event.
    pub fn encode_event<E: PipeEvent>(event: &E) -> Result<EncodedBuffer> {
        let payload = event.payload()?;
        let kind = payload.kind();
        Self::encode(payload).inspect_err(|e| {
            debug!(
                "Encoding {} payload of commit {} failed: {}",
                kind,
                event.commit_id(),
                e
            );
        })
    }

    /// Encode an event and append it to `buffers`.
    ///
    /// Returns the category and the appended length. Nothing is appended on
    /// error.
    pub fn encode_into<E: PipeEvent>(
        event: &E,
        buffers: &mut CategorizedBuffers,
    ) -> Result<(BufferCategory, usize)> {
        let encoded = Self::encode_event(event)?;
        let result = (encoded.category, encoded.len());
        buffers.push(encoded);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PipeError, WireSerialize};
    use serde::Serialize;
    use std::sync::Arc;

    #[derive(Serialize)]
    struct Tablet {
        device: &'static str,
        timestamps: Vec<i64>,
    }

    struct Broken;

    impl Serialize for Broken {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("unsupported column type"))
        }
    }

    #[test]
    fn test_binary_is_passthrough() {
        let wal = Bytes::from_static(b"\x01\x02\x03wal-entry");
        let encoded = EventEncoder::encode(EventPayload::Binary(wal.clone())).unwrap();

        assert_eq!(encoded.category, BufferCategory::Binary);
        assert_eq!(encoded.bytes, wal);
        // Same backing storage, no copy
        assert_eq!(encoded.bytes.as_ptr(), wal.as_ptr());
    }

    #[test]
    fn test_insert_node_serialized_directly() {
        let node = Tablet {
            device: "root.sg.d1",
            timestamps: vec![1, 2],
        };
        let expected = postcard::to_allocvec(&node).unwrap();

        let encoded = EventEncoder::encode(EventPayload::InsertNode(Arc::new(node))).unwrap();

        assert_eq!(encoded.category, BufferCategory::InsertNode);
        assert_eq!(encoded.bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_tablet_has_trailing_aligned_flag() {
        let tablet: Arc<dyn WireSerialize> = Arc::new(Tablet {
            device: "root.sg.d2",
            timestamps: vec![10],
        });

        let aligned = EventEncoder::encode(EventPayload::Tablet {
            tablet: Arc::clone(&tablet),
            aligned: true,
        })
        .unwrap();
        let unaligned = EventEncoder::encode(EventPayload::Tablet {
            tablet,
            aligned: false,
        })
        .unwrap();

        assert_eq!(aligned.category, BufferCategory::Tablet);
        assert_eq!(aligned.bytes.last(), Some(&1));
        assert_eq!(unaligned.bytes.last(), Some(&0));
        assert_eq!(aligned.len(), unaligned.len());
        assert_eq!(
            aligned.bytes[..aligned.len() - 1],
            unaligned.bytes[..unaligned.len() - 1]
        );
    }

    #[test]
    fn test_serialization_failure() {
        let err = EventEncoder::encode(EventPayload::Tablet {
            tablet: Arc::new(Broken),
            aligned: false,
        })
        .unwrap_err();

        assert!(matches!(err, PipeError::Serialization(_)));
        assert!(err.is_encoding_failure());
    }

    #[derive(Debug)]
    struct BrokenTabletEvent;

    impl PartialEq for BrokenTabletEvent {
        fn eq(&self, _: &Self) -> bool {
            true
        }
    }

    impl PipeEvent for BrokenTabletEvent {
        fn commit_id(&self) -> u64 {
            42
        }

        fn increase_reference_count(&self, _holder: &str) -> bool {
            true
        }

        fn decrease_reference_count(&self, _holder: &str) -> bool {
            true
        }

        fn report_message(&self) -> String {
            "BrokenTabletEvent".to_string()
        }

        fn payload(&self) -> Result<EventPayload> {
            Ok(EventPayload::Tablet {
                tablet: Arc::new(Broken),
                aligned: true,
            })
        }
    }

    #[test]
    fn test_encode_into_failure_appends_nothing() {
        let mut buffers = CategorizedBuffers::new();
        buffers.push(EncodedBuffer {
            category: BufferCategory::Tablet,
            bytes: Bytes::from_static(b"tab\x00"),
        });

        let err = EventEncoder::encode_into(&BrokenTabletEvent, &mut buffers).unwrap_err();

        assert!(matches!(err, PipeError::Serialization(_)));
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers.total_bytes(), 4);
    }

    #[test]
    fn test_categorized_buffers_accounting() {
        let mut buffers = CategorizedBuffers::new();
        assert!(buffers.is_empty());

        buffers.push(EncodedBuffer {
            category: BufferCategory::Binary,
            bytes: Bytes::from_static(b"abc"),
        });
        buffers.push(EncodedBuffer {
            category: BufferCategory::Tablet,
            bytes: Bytes::from_static(b"defgh"),
        });
        buffers.push(EncodedBuffer {
            category: BufferCategory::Binary,
            bytes: Bytes::from_static(b"i"),
        });

        assert!(!buffers.is_empty());
        assert_eq!(buffers.len(), 3);
        assert_eq!(buffers.total_bytes(), 9);
        assert_eq!(
            buffers.get(BufferCategory::Binary),
            &[Bytes::from_static(b"abc"), Bytes::from_static(b"i")]
        );
        assert!(buffers.get(BufferCategory::InsertNode).is_empty());

        buffers.clear();
        assert!(buffers.is_empty());
        assert_eq!(buffers.total_bytes(), 0);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(BufferCategory::InsertNode.to_string(), "insert_node");
        assert_eq!(BufferCategory::ALL.len(), 3);
    }
}
