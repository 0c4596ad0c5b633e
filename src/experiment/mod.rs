//! Experiment orchestration for agent-driven measurements.
//!
//! # Architecture (Bluesky-inspired)
//!
//! - **Agents** decide which sample to measure next ([`crate::agent`])
//! - **AdaptiveLoop**: state machine that sequences ask, measure and tell
//!   until the shot budget is spent
//! - **Documents**: structured data stream (Start, Event, Stop) published
//!   while the loop runs
//!
//! # Example
//!
//! ```rust,ignore
//! use adaptive_beamline::agent::RoundRobinAgent;
//! use adaptive_beamline::experiment::AdaptiveLoop;
//! use adaptive_beamline::hardware::SimulatedBeamline;
//!
//! let beamline = SimulatedBeamline::new(vec![1.0, 0.5, 0.1]);
//! let agent = RoundRobinAgent::new(3)?;
//! let mut adaptive = AdaptiveLoop::new(agent, 3, 30, beamline)?;
//!
//! let cancel = adaptive.cancel_handle();
//! let report = adaptive.run().await?;
//! println!("{} shots, {}", report.trace.len(), report.status);
//! ```

pub mod adaptive_loop;
pub mod document;

pub use adaptive_loop::{
    run_to_completion, AdaptiveLoop, CancelHandle, LoopState, RunReport, RunStatus,
};
pub use document::{Document, EventDoc, StartDoc, StopDoc};
