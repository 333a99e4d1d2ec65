//! Shared fixtures for rivven-pipe integration tests

#![allow(dead_code)]

use bytes::Bytes;
use rivven_pipe::{EventPayload, PipeError, PipeEvent, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

/// Initialize logging for tests (only once)
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("rivven_pipe=debug".parse().unwrap()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Structured insert, serialized as-is
#[derive(Debug, Clone, Serialize)]
pub struct InsertRow {
    pub device: String,
    pub timestamp: i64,
    pub values: Vec<f64>,
}

impl InsertRow {
    pub fn new(device: &str, timestamp: i64, values: &[f64]) -> Self {
        Self {
            device: device.to_string(),
            timestamp,
            values: values.to_vec(),
        }
    }
}

/// Canonical tablet form of generic row values
#[derive(Debug, Clone, Serialize)]
pub struct TabletRows {
    pub device: String,
    pub measurements: Vec<String>,
    pub timestamps: Vec<i64>,
}

impl TabletRows {
    pub fn new(device: &str, measurements: &[&str], timestamps: &[i64]) -> Self {
        Self {
            device: device.to_string(),
            measurements: measurements.iter().map(|m| m.to_string()).collect(),
            timestamps: timestamps.to_vec(),
        }
    }
}

/// Tablet whose conversion fails mid-serialization
pub struct FailingTablet;

impl Serialize for FailingTablet {
    fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("unsupported data type"))
    }
}

#[derive(Debug, Clone)]
pub enum TestPayload {
    Binary(Bytes),
    InsertNode(InsertRow),
    Tablet(TabletRows, bool),
    FailingTablet,
    Unavailable,
}

/// Event with observable reference counting.
///
/// Equality is by `id` only, like a resubmitted event after a failed send.
#[derive(Debug)]
pub struct TestEvent {
    pub id: u64,
    pub commit_id: u64,
    payload: TestPayload,
    retainable: bool,
    refs: AtomicI64,
    increases: AtomicUsize,
    decreases: AtomicUsize,
}

impl TestEvent {
    pub fn new(id: u64, payload: TestPayload) -> Self {
        Self {
            id,
            commit_id: id,
            payload,
            retainable: true,
            refs: AtomicI64::new(0),
            increases: AtomicUsize::new(0),
            decreases: AtomicUsize::new(0),
        }
    }

    /// Event backed by `len` cached WAL bytes.
    pub fn binary(id: u64, len: usize) -> Self {
        Self::new(id, TestPayload::Binary(Bytes::from(vec![id as u8; len])))
    }

    pub fn insert_node(id: u64, row: InsertRow) -> Self {
        Self::new(id, TestPayload::InsertNode(row))
    }

    pub fn tablet(id: u64, rows: TabletRows, aligned: bool) -> Self {
        Self::new(id, TestPayload::Tablet(rows, aligned))
    }

    pub fn with_commit_id(mut self, commit_id: u64) -> Self {
        self.commit_id = commit_id;
        self
    }

    /// Reference count can no longer be increased.
    pub fn reclaimed(mut self) -> Self {
        self.retainable = false;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn refs(&self) -> i64 {
        self.refs.load(Ordering::SeqCst)
    }

    pub fn increases(&self) -> usize {
        self.increases.load(Ordering::SeqCst)
    }

    pub fn decreases(&self) -> usize {
        self.decreases.load(Ordering::SeqCst)
    }
}

impl PartialEq for TestEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl PipeEvent for TestEvent {
    fn commit_id(&self) -> u64 {
        self.commit_id
    }

    fn increase_reference_count(&self, _holder: &str) -> bool {
        if !self.retainable {
            return false;
        }
        self.increases.fetch_add(1, Ordering::SeqCst);
        self.refs.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn decrease_reference_count(&self, _holder: &str) -> bool {
        self.decreases.fetch_add(1, Ordering::SeqCst);
        self.refs.fetch_sub(1, Ordering::SeqCst) > 0
    }

    fn report_message(&self) -> String {
        format!("TestEvent{{id={}, commit_id={}}}", self.id, self.commit_id)
    }

    fn payload(&self) -> Result<EventPayload> {
        match &self.payload {
            TestPayload::Binary(bytes) => Ok(EventPayload::Binary(bytes.clone())),
            TestPayload::InsertNode(row) => Ok(EventPayload::InsertNode(Arc::new(row.clone()))),
            TestPayload::Tablet(rows, aligned) => Ok(EventPayload::Tablet {
                tablet: Arc::new(rows.clone()),
                aligned: *aligned,
            }),
            TestPayload::FailingTablet => Ok(EventPayload::Tablet {
                tablet: Arc::new(FailingTablet),
                aligned: false,
            }),
            TestPayload::Unavailable => Err(PipeError::payload_unavailable(format!(
                "WAL entry for event {} already deleted",
                self.id
            ))),
        }
    }
}
