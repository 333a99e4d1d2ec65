//! Serde helpers for `bytes::Bytes` collections

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serializer};

/// Serde module for `Vec<Bytes>` fields, encoding each element as a byte
/// string rather than a sequence of integers.
pub mod vec_bytes_serde {
    use super::*;

    pub fn serialize<S>(val: &[Bytes], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(val.iter().map(|b| serde_bytes::Bytes::new(b)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Bytes>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v: Vec<serde_bytes::ByteBuf> = Deserialize::deserialize(deserializer)?;
        Ok(v.into_iter().map(|b| Bytes::from(b.into_vec())).collect())
    }
}
