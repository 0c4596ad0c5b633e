//! Decision-making agents for the ask/tell protocol.
//!
//! An agent is asked for the next sample to measure, given the most recent
//! observation, and is then told the outcome of that measurement. The loop
//! never looks inside an agent; each variant owns whatever state it needs.
//!
//! | Kind          | Decision rule                                             |
//! |---------------|-----------------------------------------------------------|
//! | `round_robin` | `0, 1, ..., N-1, 0, 1, ...` regardless of quality          |
//! | `chaos`       | uniform random index, seedable                            |
//! | `oracle`      | inverse-strength allocation from ground truth             |
//! | `learned`     | forwards to a trained policy loaded from an artifact      |
//!
//! Variants are selected from configuration via [`AgentConfig::build`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::measurement::{Observation, Quality, SampleIndex};

pub mod chaos;
pub mod learned;
pub mod oracle;
pub mod policy;
pub mod round_robin;

pub use chaos::ChaosAgent;
pub use learned::LearnedAgent;
pub use oracle::OracleAgent;
pub use policy::{JsonPolicyLoader, Policy, PolicyArtifact, PolicyLoader};
pub use round_robin::RoundRobinAgent;

/// Ask/tell contract between the loop and a decision strategy.
pub trait Agent: Send {
    /// Variant tag for logs and run documents.
    fn kind(&self) -> AgentKind;

    /// Choose the next sample to measure.
    ///
    /// `last` is `None` on the first call of a run. Agents that can fail to
    /// decide (a broken policy) report it here; the loop also range-checks
    /// whatever index comes back.
    fn ask(&mut self, last: Option<Observation>) -> Result<SampleIndex, AgentError>;

    /// Report the outcome of the measurement chosen by the previous `ask`.
    fn tell(&mut self, _sample: SampleIndex, _quality: Quality) {}
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    fn kind(&self) -> AgentKind {
        (**self).kind()
    }

    fn ask(&mut self, last: Option<Observation>) -> Result<SampleIndex, AgentError> {
        (**self).ask(last)
    }

    fn tell(&mut self, sample: SampleIndex, quality: Quality) {
        (**self).tell(sample, quality)
    }
}

/// Agent variant tag, used in logs and run documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// [`RoundRobinAgent`]
    RoundRobin,
    /// [`ChaosAgent`]
    Chaos,
    /// [`OracleAgent`]
    Oracle,
    /// [`LearnedAgent`]
    Learned,
    /// An agent supplied by the caller rather than built from configuration.
    Custom,
}

impl AgentKind {
    /// Every kind that can be built from configuration.
    pub const ALL: [AgentKind; 4] = [
        AgentKind::RoundRobin,
        AgentKind::Chaos,
        AgentKind::Oracle,
        AgentKind::Learned,
    ];

    /// Config and log name, e.g. `round_robin`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::RoundRobin => "round_robin",
            AgentKind::Chaos => "chaos",
            AgentKind::Oracle => "oracle",
            AgentKind::Learned => "learned",
            AgentKind::Custom => "custom",
        }
    }

    /// One-line description for `beamline agents`.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            AgentKind::RoundRobin => "Visit every sample in turn, ignoring quality",
            AgentKind::Chaos => "Pick a uniformly random sample each shot",
            AgentKind::Oracle => "Allocate shots inversely to true scattering strength",
            AgentKind::Learned => "Follow a trained policy loaded from a model artifact",
            AgentKind::Custom => "Caller-provided agent",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged agent selection, as read from the `[agent]` config table.
///
/// ```toml
/// [agent]
/// kind = "oracle"
/// strengths = [1.0, 0.5, 0.25]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentConfig {
    /// Cycle through the samples.
    #[default]
    RoundRobin,
    /// Uniform random picks.
    Chaos {
        /// Fixed seed for a reproducible sequence; entropy when absent.
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Inverse-strength allocation.
    Oracle {
        /// True scattering strength per sample. Empty means "take them from
        /// the simulated beamline".
        #[serde(default)]
        strengths: Vec<f64>,
    },
    /// Trained policy.
    Learned {
        /// Policy artifact to load.
        model_path: PathBuf,
    },
}

impl AgentConfig {
    /// Kind of agent this config builds.
    #[must_use]
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentConfig::RoundRobin => AgentKind::RoundRobin,
            AgentConfig::Chaos { .. } => AgentKind::Chaos,
            AgentConfig::Oracle { .. } => AgentKind::Oracle,
            AgentConfig::Learned { .. } => AgentKind::Learned,
        }
    }

    /// Build the configured agent for `sample_count` samples.
    ///
    /// Learned agents load their artifact with [`JsonPolicyLoader`]; use
    /// [`AgentConfig::build_with_loader`] to supply a different format.
    pub fn build(&self, sample_count: usize) -> Result<Box<dyn Agent>, AgentError> {
        self.build_with_loader(sample_count, &JsonPolicyLoader)
    }

    /// Build the configured agent, loading learned policies with `loader`.
    pub fn build_with_loader(
        &self,
        sample_count: usize,
        loader: &dyn PolicyLoader,
    ) -> Result<Box<dyn Agent>, AgentError> {
        let agent: Box<dyn Agent> = match self {
            AgentConfig::RoundRobin => Box::new(RoundRobinAgent::new(sample_count)?),
            AgentConfig::Chaos { seed } => Box::new(match seed {
                Some(seed) => ChaosAgent::with_seed(sample_count, *seed)?,
                None => ChaosAgent::new(sample_count)?,
            }),
            AgentConfig::Oracle { strengths } => {
                Box::new(OracleAgent::new(sample_count, strengths)?)
            }
            AgentConfig::Learned { model_path } => {
                Box::new(LearnedAgent::load(model_path, sample_count, loader)?)
            }
        };
        tracing::debug!(agent = %agent.kind(), sample_count, "Agent constructed");
        Ok(agent)
    }
}

pub(crate) fn require_samples(sample_count: usize) -> Result<(), AgentError> {
    if sample_count == 0 {
        return Err(AgentError::Construction(
            "agent needs at least one sample".to_string(),
        ));
    }
    Ok(())
}
