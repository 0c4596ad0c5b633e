//! Simulated Beamline
//!
//! Provides a simulated diffraction beamline for demos and tests without
//! physical hardware. All waiting uses `tokio::time::sleep`, not
//! `std::thread::sleep`.
//!
//! # Model
//!
//! - A sample changer holds N samples, each with a fixed scattering strength
//! - Each shot moves the changer to the sample (if it is not already there),
//!   exposes, and reads out
//! - The returned badness is `1 / sqrt(strength * exposures)`, scaled by
//!   `1 + noise * u` with `u` uniform in `[-1, 1]`: weak scatterers and
//!   rarely measured samples look bad
//!
//! This is a stand-in for the real detector pipeline, not a noise model.
//!
//! # Fault Injection
//!
//! [`SimulatedBeamline::inject_failures`] queues hardware faults against a
//! sample; each queued fault fails the next attempt on that sample.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{sleep, Duration};

use crate::error::MeasurementError;
use crate::measurement::{Acquisition, Quality, SampleIndex};

/// Simulated sample changer + detector.
///
/// # Example
///
/// ```rust,ignore
/// let mut beamline = SimulatedBeamline::new(vec![1.0, 0.25]).with_seed(7);
/// let badness = beamline.measure(1).await?;
/// assert_eq!(beamline.exposures(1), 1);
/// ```
#[derive(Debug)]
pub struct SimulatedBeamline {
    strengths: Vec<f64>,
    exposures: Vec<u64>,
    noise: f64,
    rng: StdRng,
    exposure_time: Duration,
    move_time_per_slot: Duration,
    current_slot: Option<SampleIndex>,
    pending_faults: HashMap<SampleIndex, u32>,
    call_log: Vec<String>,
}

impl SimulatedBeamline {
    /// Noise-free beamline with no latency.
    pub fn new(strengths: Vec<f64>) -> Self {
        let count = strengths.len();
        Self {
            strengths,
            exposures: vec![0; count],
            noise: 0.0,
            rng: StdRng::seed_from_u64(0),
            exposure_time: Duration::ZERO,
            move_time_per_slot: Duration::ZERO,
            current_slot: None,
            pending_faults: HashMap::new(),
            call_log: Vec::new(),
        }
    }

    /// Relative noise amplitude on each shot (0.0 = deterministic).
    #[must_use]
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.max(0.0);
        self
    }

    /// Seed the noise generator.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Exposure plus readout time per shot.
    #[must_use]
    pub fn with_exposure_time(mut self, exposure_time: Duration) -> Self {
        self.exposure_time = exposure_time;
        self
    }

    /// Sample changer travel time between adjacent slots.
    #[must_use]
    pub fn with_move_time(mut self, move_time_per_slot: Duration) -> Self {
        self.move_time_per_slot = move_time_per_slot;
        self
    }

    /// Fail the next `count` attempts on `sample`.
    pub fn inject_failures(&mut self, sample: SampleIndex, count: u32) {
        *self.pending_faults.entry(sample).or_insert(0) += count;
    }

    /// Successful exposures of `sample` so far.
    pub fn exposures(&self, sample: SampleIndex) -> u64 {
        self.exposures.get(sample).copied().unwrap_or(0)
    }

    /// Every `measure` call, including failed ones.
    pub fn call_log(&self) -> &[String] {
        &self.call_log
    }

    async fn move_to(&mut self, sample: SampleIndex) {
        if self.current_slot == Some(sample) {
            return;
        }
        let from = self.current_slot.unwrap_or(0);
        let slots = from.abs_diff(sample) as u32;
        let travel = self.move_time_per_slot * slots;
        tracing::trace!(from, to = sample, ?travel, "Moving sample changer");
        if !travel.is_zero() {
            sleep(travel).await;
        }
        self.current_slot = Some(sample);
    }

    fn take_fault(&mut self, sample: SampleIndex) -> bool {
        match self.pending_faults.get_mut(&sample) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Acquisition for SimulatedBeamline {
    async fn measure(&mut self, sample: SampleIndex) -> Result<Quality, MeasurementError> {
        self.call_log.push(format!("measure: {sample}"));

        let Some(&strength) = self.strengths.get(sample) else {
            return Err(MeasurementError::Hardware {
                sample,
                reason: format!("no sample loaded in slot {sample}"),
            });
        };

        self.move_to(sample).await;
        if !self.exposure_time.is_zero() {
            sleep(self.exposure_time).await;
        }

        if self.take_fault(sample) {
            return Err(MeasurementError::Hardware {
                sample,
                reason: "injected detector fault".to_string(),
            });
        }

        self.exposures[sample] += 1;
        let exposures = self.exposures[sample] as f64;
        let jitter = if self.noise > 0.0 {
            1.0 + self.noise * self.rng.gen_range(-1.0..=1.0)
        } else {
            1.0
        };
        Ok(jitter / (strength * exposures).sqrt())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
