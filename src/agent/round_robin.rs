//! Naive agent: visit every sample in turn.

use super::{require_samples, Agent, AgentKind};
use crate::error::AgentError;
use crate::measurement::{Observation, SampleIndex};

/// Cycles `0, 1, ..., N-1` forever, ignoring measurement quality.
#[derive(Debug, Clone)]
pub struct RoundRobinAgent {
    sample_count: usize,
    cursor: SampleIndex,
}

impl RoundRobinAgent {
    /// Start at sample 0.
    pub fn new(sample_count: usize) -> Result<Self, AgentError> {
        require_samples(sample_count)?;
        Ok(Self {
            sample_count,
            cursor: 0,
        })
    }
}

impl Agent for RoundRobinAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::RoundRobin
    }

    fn ask(&mut self, _last: Option<Observation>) -> Result<SampleIndex, AgentError> {
        let next = self.cursor;
        self.cursor = (self.cursor + 1) % self.sample_count;
        Ok(next)
    }
}
