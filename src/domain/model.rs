use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One stored object: its full name and size in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    pub size: u64,
}

impl ObjectEntry {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Parameters for one listing call against the object store.
///
/// `start_offset` is inclusive and `end_offset` is exclusive, matching the
/// storage API, so adjacent ranges never return the same object twice.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub prefix: String,
    pub start_offset: Option<String>,
    pub end_offset: Option<String>,
    pub page_token: Option<String>,
    pub max_results: Option<u32>,
}

/// One page of listing results.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub items: Vec<ObjectEntry>,
    pub next_page_token: Option<String>,
}

/// Outcome of a full listing run, as reported by the perf harness.
#[derive(Debug, Clone)]
pub struct ListingReport {
    pub object_count: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
    pub workers: usize,
}

impl ListingReport {
    pub fn objects_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.object_count as f64 / secs
        } else {
            0.0
        }
    }
}
