//! Core library for the adaptive beamline.
//!
//! This library contains the ask/tell loop that lets a decision-making agent
//! choose which sample a diffraction beamline measures next, the four agent
//! strategies (round-robin, chaos, oracle, learned policy), the per-sample
//! bookkeeping the loop keeps, and a simulated beamline for demos and tests.
//! It is used by the `beamline` command-line tool.

pub mod agent;
pub mod config;
pub mod error;
pub mod error_recovery;
pub mod experiment;
pub mod hardware;
pub mod measurement;
pub mod telemetry;

pub use agent::{Agent, AgentConfig, AgentKind};
pub use error::{AgentError, AppResult, BeamlineError, LoopError, MeasurementError, RunFailure};
pub use experiment::{AdaptiveLoop, CancelHandle, LoopState, RunReport, RunStatus};
pub use measurement::{Acquisition, ExperimentTrace, MeasurementRecord, Quality, SampleIndex};
