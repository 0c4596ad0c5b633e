//! Learned-policy agent.
//!
//! Forwards each decision to a trained [`Policy`]. The policy is loaded when
//! the agent is built, so a missing or malformed artifact is reported before
//! any run starts. Out-of-range policy output is rejected rather than
//! clamped: a policy that names a sample we do not have is a model bug, and
//! silently measuring some other sample would hide it.

use std::path::Path;

use super::policy::{Policy, PolicyLoader};
use super::{require_samples, Agent, AgentKind};
use crate::error::AgentError;
use crate::measurement::{Observation, SampleIndex};

/// Agent backed by a trained [`Policy`].
pub struct LearnedAgent {
    policy: Box<dyn Policy>,
    sample_count: usize,
}

impl std::fmt::Debug for LearnedAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearnedAgent")
            .field("policy_version", &self.policy.version())
            .field("sample_count", &self.sample_count)
            .finish()
    }
}

impl LearnedAgent {
    /// Load the policy at `path` and wrap it.
    pub fn load(
        path: impl AsRef<Path>,
        sample_count: usize,
        loader: &dyn PolicyLoader,
    ) -> Result<Self, AgentError> {
        require_samples(sample_count)?;
        let policy = loader.load(path.as_ref(), sample_count)?;
        Ok(Self {
            policy,
            sample_count,
        })
    }

    /// Wrap a policy that is already in memory.
    pub fn from_policy(policy: Box<dyn Policy>, sample_count: usize) -> Result<Self, AgentError> {
        require_samples(sample_count)?;
        Ok(Self {
            policy,
            sample_count,
        })
    }

    /// Version string of the wrapped policy.
    pub fn policy_version(&self) -> &str {
        self.policy.version()
    }
}

impl Agent for LearnedAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Learned
    }

    fn ask(&mut self, last: Option<Observation>) -> Result<SampleIndex, AgentError> {
        let index = self.policy.decide(last);
        if index >= self.sample_count {
            return Err(AgentError::InvalidPolicyOutput {
                index,
                sample_count: self.sample_count,
            });
        }
        Ok(index)
    }
}
