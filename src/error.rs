//! Error types for the adaptive beamline.
//!
//! Errors are split by the stage at which they can occur, so callers can tell
//! a setup problem from a problem that ended a run part-way through:
//!
//! - **[`AgentError`]**: raised by agents. `Construction` and `ModelLoad` are
//!   fatal before a loop ever starts; `InvalidPolicyOutput` surfaces from
//!   `ask` and terminates the run as an agent protocol violation.
//! - **[`MeasurementError`]**: raised by an [`Acquisition`](crate::measurement::Acquisition)
//!   backend for a single shot. The loop retries these locally.
//! - **[`LoopError`]**: misuse of the loop itself (zero samples, running a
//!   finished loop).
//! - **[`RunFailure`]**: the reason carried by a `Failed` terminal status.
//! - **[`BeamlineError`]**: top-level error for building a run from
//!   configuration; consolidates [`ConfigError`], agent and loop setup
//!   errors for use with the `?` operator.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::measurement::SampleIndex;

/// Convenience alias for results using the top-level error type.
pub type AppResult<T> = std::result::Result<T, BeamlineError>;

/// Errors produced by agents, either while being built or while deciding.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentError {
    /// Invalid construction parameters, such as zero samples.
    #[error("Agent construction failed: {0}")]
    Construction(String),

    /// A learned-policy artifact could not be read or did not fit the run.
    #[error("Failed to load policy model from {}: {reason}", path.display())]
    ModelLoad {
        /// Artifact location.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A learned policy named a sample outside `[0, sample_count)`.
    #[error("Policy returned sample {index}, but only {sample_count} samples exist")]
    InvalidPolicyOutput {
        /// The index the policy produced.
        index: SampleIndex,
        /// Samples on the changer.
        sample_count: usize,
    },

    /// Any agent named a sample outside `[0, sample_count)`.
    #[error("Agent chose sample {index}, but only {sample_count} samples exist")]
    SampleOutOfRange {
        /// The index the agent produced.
        index: SampleIndex,
        /// Samples on the changer.
        sample_count: usize,
    },
}

impl AgentError {
    /// Whether this error can only occur before a run starts.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            AgentError::Construction(_) | AgentError::ModelLoad { .. }
        )
    }
}

/// A single failed shot, as reported by the acquisition backend.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementError {
    /// The detector or changer reported a fault.
    #[error("Hardware fault while measuring sample {sample}: {reason}")]
    Hardware {
        /// Sample being measured.
        sample: SampleIndex,
        /// Fault description from the backend.
        reason: String,
    },

    /// Readout did not complete in time.
    #[error("Detector readout timed out for sample {sample}")]
    Timeout {
        /// Sample being measured.
        sample: SampleIndex,
    },

    /// The backend is gone.
    #[error("Acquisition backend disconnected")]
    Disconnected,
}

/// Misuse of an [`AdaptiveLoop`](crate::experiment::AdaptiveLoop).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoopError {
    /// A loop needs at least one sample.
    #[error("Sample count must be at least 1")]
    InvalidSampleCount,

    /// `run()` was called on a loop that is no longer in `Init`.
    #[error("Loop has already finished; construct a new loop for another run")]
    AlreadyFinished,
}

/// Why a run ended in `Failed`.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunFailure {
    /// The agent could not decide, or chose a sample that does not exist.
    #[error("Agent protocol error: {0}")]
    AgentProtocol(#[source] AgentError),

    /// A shot failed on every allowed attempt.
    #[error("Measurement failed after retry: {0}")]
    Measurement(#[source] MeasurementError),
}

/// Top-level error for setting up a run from configuration.
#[derive(Error, Debug)]
pub enum BeamlineError {
    /// Configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The configured agent could not be built.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// The loop rejected its parameters.
    #[error(transparent)]
    Loop(#[from] LoopError),
}
