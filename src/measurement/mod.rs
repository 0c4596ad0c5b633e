// src/measurement/mod.rs

//! Per-shot acquisition seam and the bookkeeping the loop keeps about it.

use async_trait::async_trait;

use crate::error::MeasurementError;

pub mod record;
pub mod trace;

pub use record::MeasurementRecord;
pub use trace::{ExperimentTrace, TraceEntry};

/// Index of a sample on the sample changer, in `[0, N)`.
pub type SampleIndex = usize;

/// Badness signal of one shot (inverse signal-to-noise; higher needs more shots).
pub type Quality = f64;

/// The most recent measurement, as handed to an agent's `ask`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    /// Sample that was measured.
    pub sample: SampleIndex,
    /// Quality of that shot.
    pub quality: Quality,
}

/// Performs one physical (or simulated) exposure of a sample.
///
/// Owned by the surrounding hardware layer and handed to the loop by value.
/// Calls may block for the full exposure and readout time; the loop awaits
/// each call before issuing the next, so implementations never see two
/// concurrent measurements.
#[async_trait]
pub trait Acquisition: Send {
    async fn measure(&mut self, sample: SampleIndex) -> Result<Quality, MeasurementError>;
}

#[async_trait]
impl<T: Acquisition + ?Sized> Acquisition for Box<T> {
    async fn measure(&mut self, sample: SampleIndex) -> Result<Quality, MeasurementError> {
        (**self).measure(sample).await
    }
}
