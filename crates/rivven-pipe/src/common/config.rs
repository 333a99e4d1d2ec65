//! Batch configuration
//!
//! Two option groups are recognized: the maximum batch size in bytes and
//! the maximum delay before a forced flush, in seconds. Both can be given
//! under a `connector.` key or a `sink.` alias; the first key present wins.

use crate::common::{PipeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// Max delay key, connector form
pub const CONNECTOR_BATCH_DELAY_KEY: &str = "connector.batch.max-delay-seconds";
/// Max delay key, sink form
pub const SINK_BATCH_DELAY_KEY: &str = "sink.batch.max-delay-seconds";
/// Max batch size key, connector form
pub const CONNECTOR_BATCH_SIZE_KEY: &str = "connector.batch.size-bytes";
/// Max batch size key, sink form
pub const SINK_BATCH_SIZE_KEY: &str = "sink.batch.size-bytes";

pub const DEFAULT_BATCH_DELAY_SECONDS: u32 = 1;
pub const DEFAULT_BATCH_SIZE_BYTES: u64 = 16 * 1024 * 1024; // 16 MiB

fn default_max_delay_seconds() -> u32 {
    DEFAULT_BATCH_DELAY_SECONDS
}

fn default_max_batch_size_bytes() -> u64 {
    DEFAULT_BATCH_SIZE_BYTES
}

/// Configuration for a batch accumulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BatchConfig {
    /// Maximum time a non-empty batch may wait before it must be flushed
    #[serde(default = "default_max_delay_seconds")]
    #[validate(range(max = 86_400))]
    pub max_delay_seconds: u32,

    /// Requested batch size limit; the granted budget may be smaller
    #[serde(default = "default_max_batch_size_bytes")]
    #[validate(range(min = 1))]
    pub max_batch_size_bytes: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_delay_seconds: DEFAULT_BATCH_DELAY_SECONDS,
            max_batch_size_bytes: DEFAULT_BATCH_SIZE_BYTES,
        }
    }
}

impl BatchConfig {
    /// Create a new builder.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }

    /// Create config optimized for latency.
    pub fn low_latency() -> Self {
        Self {
            max_delay_seconds: 0,
            max_batch_size_bytes: 1024 * 1024, // 1MB
        }
    }

    /// Create config optimized for throughput.
    pub fn high_throughput() -> Self {
        Self {
            max_delay_seconds: 5,
            max_batch_size_bytes: 64 * 1024 * 1024, // 64MB
        }
    }

    /// Read the batch options from a flat connector parameter map.
    pub fn from_parameters(parameters: &HashMap<String, String>) -> Result<Self> {
        let config = Self {
            max_delay_seconds: parse_first(
                parameters,
                &[CONNECTOR_BATCH_DELAY_KEY, SINK_BATCH_DELAY_KEY],
                DEFAULT_BATCH_DELAY_SECONDS,
            )?,
            max_batch_size_bytes: parse_first(
                parameters,
                &[CONNECTOR_BATCH_SIZE_KEY, SINK_BATCH_SIZE_KEY],
                DEFAULT_BATCH_SIZE_BYTES,
            )?,
        };
        config.validated()
    }

    /// Validate and return self.
    pub fn validated(self) -> Result<Self> {
        self.validate()
            .map_err(|e| PipeError::config(e.to_string()))?;
        Ok(self)
    }

    /// Max delay in milliseconds.
    pub fn max_delay_ms(&self) -> u64 {
        u64::from(self.max_delay_seconds) * 1000
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms())
    }
}

fn parse_first<T>(parameters: &HashMap<String, String>, keys: &[&str], default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some((key, raw)) = keys
        .iter()
        .find_map(|k| parameters.get(*k).map(|v| (*k, v)))
    else {
        return Ok(default);
    };

    raw.trim()
        .parse()
        .map_err(|e| PipeError::config(format!("invalid value '{}' for {}: {}", raw, key, e)))
}

/// Builder for BatchConfig.
#[derive(Default)]
pub struct BatchConfigBuilder {
    max_delay_seconds: Option<u32>,
    max_batch_size_bytes: Option<u64>,
}

impl BatchConfigBuilder {
    pub fn max_delay_seconds(mut self, secs: u32) -> Self {
        self.max_delay_seconds = Some(secs);
        self
    }

    pub fn max_batch_size_bytes(mut self, bytes: u64) -> Self {
        self.max_batch_size_bytes = Some(bytes);
        self
    }

    pub fn build(self) -> BatchConfig {
        let default = BatchConfig::default();
        BatchConfig {
            max_delay_seconds: self.max_delay_seconds.unwrap_or(default.max_delay_seconds),
            max_batch_size_bytes: self
                .max_batch_size_bytes
                .unwrap_or(default.max_batch_size_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.max_delay_seconds, 1);
        assert_eq!(config.max_batch_size_bytes, 16 * 1024 * 1024);
        assert_eq!(config.max_delay_ms(), 1000);
        assert_eq!(config.max_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_builder() {
        let config = BatchConfig::builder()
            .max_delay_seconds(5)
            .max_batch_size_bytes(100)
            .build();

        assert_eq!(config.max_delay_ms(), 5000);
        assert_eq!(config.max_batch_size_bytes, 100);

        let partial = BatchConfig::builder().max_batch_size_bytes(42).build();
        assert_eq!(partial.max_delay_seconds, DEFAULT_BATCH_DELAY_SECONDS);
    }

    #[test]
    fn test_presets() {
        assert!(BatchConfig::low_latency().max_delay_ms() < BatchConfig::default().max_delay_ms());
        assert!(
            BatchConfig::high_throughput().max_batch_size_bytes
                > BatchConfig::default().max_batch_size_bytes
        );
    }

    #[test]
    fn test_from_empty_parameters_uses_defaults() {
        let config = BatchConfig::from_parameters(&HashMap::new()).unwrap();
        assert_eq!(config, BatchConfig::default());
    }

    #[test]
    fn test_from_parameters_connector_keys() {
        let config = BatchConfig::from_parameters(&params(&[
            (CONNECTOR_BATCH_DELAY_KEY, "3"),
            (CONNECTOR_BATCH_SIZE_KEY, "4096"),
        ]))
        .unwrap();

        assert_eq!(config.max_delay_ms(), 3000);
        assert_eq!(config.max_batch_size_bytes, 4096);
    }

    #[test]
    fn test_from_parameters_sink_alias() {
        let config = BatchConfig::from_parameters(&params(&[
            (SINK_BATCH_DELAY_KEY, "2"),
            (SINK_BATCH_SIZE_KEY, " 512 "),
        ]))
        .unwrap();

        assert_eq!(config.max_delay_seconds, 2);
        assert_eq!(config.max_batch_size_bytes, 512);
    }

    #[test]
    fn test_connector_key_takes_precedence() {
        let config = BatchConfig::from_parameters(&params(&[
            (CONNECTOR_BATCH_SIZE_KEY, "100"),
            (SINK_BATCH_SIZE_KEY, "200"),
        ]))
        .unwrap();

        assert_eq!(config.max_batch_size_bytes, 100);
    }

    #[test]
    fn test_invalid_parameter_value() {
        let err =
            BatchConfig::from_parameters(&params(&[(SINK_BATCH_DELAY_KEY, "soon")])).unwrap_err();

        assert!(matches!(err, PipeError::Config(_)));
        assert!(err.to_string().contains(SINK_BATCH_DELAY_KEY));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err =
            BatchConfig::from_parameters(&params(&[(CONNECTOR_BATCH_SIZE_KEY, "0")])).unwrap_err();
        assert!(matches!(err, PipeError::Config(_)));
    }

    #[test]
    fn test_serde_defaults() {
        let config: BatchConfig =
            serde_json::from_str(r#"{"max_batch_size_bytes": 2048}"#).unwrap();
        assert_eq!(config.max_batch_size_bytes, 2048);
        assert_eq!(config.max_delay_seconds, DEFAULT_BATCH_DELAY_SECONDS);

        let json = serde_json::to_string(&config).unwrap();
        let back: BatchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
