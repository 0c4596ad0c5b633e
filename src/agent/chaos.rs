//! Random agent.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{require_samples, Agent, AgentKind};
use crate::error::AgentError;
use crate::measurement::{Observation, SampleIndex};

/// Picks a uniformly random sample on every call, independent of history.
#[derive(Debug, Clone)]
pub struct ChaosAgent {
    sample_count: usize,
    rng: StdRng,
}

impl ChaosAgent {
    /// Seeded from OS entropy.
    pub fn new(sample_count: usize) -> Result<Self, AgentError> {
        require_samples(sample_count)?;
        Ok(Self {
            sample_count,
            rng: StdRng::from_entropy(),
        })
    }

    /// Reproducible sequence for a given seed.
    pub fn with_seed(sample_count: usize, seed: u64) -> Result<Self, AgentError> {
        require_samples(sample_count)?;
        Ok(Self {
            sample_count,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl Agent for ChaosAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Chaos
    }

    fn ask(&mut self, _last: Option<Observation>) -> Result<SampleIndex, AgentError> {
        Ok(self.rng.gen_range(0..self.sample_count))
    }
}
