//! Hardware backends for the acquisition seam.
//!
//! Real beamline drivers live with the orchestration layer; this crate only
//! ships the simulated beamline used by the CLI and the tests.

pub mod mock;

pub use mock::SimulatedBeamline;
