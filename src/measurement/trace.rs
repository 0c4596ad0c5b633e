//! Chronological log of every shot in a run.

use serde::{Deserialize, Serialize};

use super::{Quality, SampleIndex};

/// One completed shot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Sample measured.
    pub sample: SampleIndex,
    /// Quality returned for the shot.
    pub quality: Quality,
}

/// Append-only sequence of [`TraceEntry`] in the order shots were taken.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentTrace {
    entries: Vec<TraceEntry>,
}

impl ExperimentTrace {
    /// Empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, sample: SampleIndex, quality: Quality) {
        self.entries.push(TraceEntry { sample, quality });
    }

    /// Number of shots taken.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no shot has been taken.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the order they were taken.
    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    /// Sample indices in visiting order.
    pub fn samples(&self) -> Vec<SampleIndex> {
        self.iter().map(|e| e.sample).collect()
    }

    /// Number of entries for `sample`.
    pub fn count_for(&self, sample: SampleIndex) -> usize {
        self.iter().filter(|e| e.sample == sample).count()
    }
}
