//! Document model for adaptive runs.
//!
//! Every run publishes a Bluesky-style document stream, so storage and
//! visualization can follow along without reaching into the loop:
//!
//! - **StartDoc**: agent, sample count and budget
//! - **EventDoc**: one per completed shot
//! - **StopDoc**: exit status and summary
//!
//! # Document Flow
//!
//! ```text
//! StartDoc (1)
//!    │
//!    └── EventDoc (0..=max_shots)
//!    │
//! StopDoc (1)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::agent::AgentKind;
use crate::measurement::{Quality, SampleIndex};

/// Generate a new unique document ID
pub fn new_uid() -> String {
    Uuid::new_v4().to_string()
}

/// Current timestamp in nanoseconds since Unix epoch
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Document types for run data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Document {
    /// Run opened.
    Start(StartDoc),
    /// One shot recorded.
    Event(EventDoc),
    /// Run closed.
    Stop(StopDoc),
}

impl Document {
    /// Get the document UID
    pub fn uid(&self) -> &str {
        match self {
            Document::Start(d) => &d.uid,
            Document::Event(d) => &d.uid,
            Document::Stop(d) => &d.uid,
        }
    }

    /// Get the run UID this document belongs to
    pub fn run_uid(&self) -> &str {
        match self {
            Document::Start(d) => &d.uid, // Start doc UID is the run UID
            Document::Event(d) => &d.run_uid,
            Document::Stop(d) => &d.run_uid,
        }
    }
}

/// Start document - emitted when a run begins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartDoc {
    /// Unique run identifier (this IS the run_uid)
    pub uid: String,
    /// Agent driving the run
    pub agent: AgentKind,
    /// Samples on the changer
    pub sample_count: usize,
    /// Shot budget
    pub max_shots: u64,
    /// User-provided metadata
    pub metadata: HashMap<String, String>,
    /// Creation time, ns since the Unix epoch
    pub time_ns: u64,
}

impl StartDoc {
    /// New start document with a fresh run uid.
    pub fn new(agent: AgentKind, sample_count: usize, max_shots: u64) -> Self {
        Self {
            uid: new_uid(),
            agent,
            sample_count,
            max_shots,
            metadata: HashMap::new(),
            time_ns: now_ns(),
        }
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Event document - one completed shot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDoc {
    /// Document uid
    pub uid: String,
    /// Links to StartDoc
    pub run_uid: String,
    /// Position of this shot in the trace
    pub seq_num: u64,
    /// Sample measured
    pub sample: SampleIndex,
    /// Quality of this shot
    pub quality: Quality,
    /// Shot count of `sample` after this shot
    pub shot_count: u64,
    /// Running quality estimate of `sample` after this shot
    pub quality_estimate: Quality,
    /// Budget left after this shot
    pub remaining_shots: u64,
    /// Creation time, ns since the Unix epoch
    pub time_ns: u64,
}

/// Stop document - emitted at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopDoc {
    /// Document uid
    pub uid: String,
    /// Links to StartDoc
    pub run_uid: String,
    /// Exit status: "success", "abort", "fail"
    pub exit_status: String,
    /// Reason for abort/failure
    pub reason: String,
    /// Creation time, ns since the Unix epoch
    pub time_ns: u64,
    /// Total events emitted
    pub num_events: u64,
}

impl StopDoc {
    /// Close run `run_uid` with `exit_status` after `num_events` events.
    pub fn new(run_uid: &str, exit_status: &str, reason: &str, num_events: u64) -> Self {
        Self {
            uid: new_uid(),
            run_uid: run_uid.to_string(),
            exit_status: exit_status.to_string(),
            reason: reason.to_string(),
            time_ns: now_ns(),
            num_events,
        }
    }
}
