//! Oracle agent: cheats by knowing the true scattering strength of every sample.
//!
//! Weak scatterers need more exposures to reach the same signal-to-noise, so
//! the oracle targets a share of the budget proportional to `1 / strength`.
//! The schedule is a deficit rule: each shot goes to the sample that is
//! furthest behind its target, `argmax_i (w_i * (t + 1) - shots_i)`, with
//! ties going to the lowest index. Every sample stays within one shot of its
//! ideal allocation at all times, and the sequence is fully determined by the
//! strengths.

use super::{require_samples, Agent, AgentKind};
use crate::error::AgentError;
use crate::measurement::{Observation, Quality, SampleIndex};

/// Deficit-schedule agent over known scattering strengths.
#[derive(Debug, Clone)]
pub struct OracleAgent {
    /// Target fraction of shots per sample; sums to 1.
    shares: Vec<f64>,
    shots: Vec<u64>,
    total_shots: u64,
}

impl OracleAgent {
    /// `strengths` must hold one positive, finite value per sample.
    pub fn new(sample_count: usize, strengths: &[f64]) -> Result<Self, AgentError> {
        require_samples(sample_count)?;
        if strengths.len() != sample_count {
            return Err(AgentError::Construction(format!(
                "oracle needs one strength per sample: got {} for {} samples",
                strengths.len(),
                sample_count
            )));
        }
        if let Some((index, s)) = strengths
            .iter()
            .enumerate()
            .find(|(_, s)| !s.is_finite() || **s <= 0.0)
        {
            return Err(AgentError::Construction(format!(
                "scattering strength for sample {index} must be positive and finite, got {s}"
            )));
        }

        let inverse: Vec<f64> = strengths.iter().map(|s| 1.0 / s).collect();
        let total: f64 = inverse.iter().sum();
        let shares = inverse.iter().map(|w| w / total).collect();

        Ok(Self {
            shares,
            shots: vec![0; sample_count],
            total_shots: 0,
        })
    }

    /// Target fraction of the budget for each sample.
    pub fn shares(&self) -> &[f64] {
        &self.shares
    }

    fn most_behind(&self) -> SampleIndex {
        let horizon = (self.total_shots + 1) as f64;
        let mut best = 0;
        let mut best_deficit = f64::NEG_INFINITY;
        for (index, (share, shots)) in self.shares.iter().zip(&self.shots).enumerate() {
            let deficit = share * horizon - *shots as f64;
            // Strict comparison keeps the lowest index on ties.
            if deficit > best_deficit {
                best = index;
                best_deficit = deficit;
            }
        }
        best
    }
}

impl Agent for OracleAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Oracle
    }

    fn ask(&mut self, _last: Option<Observation>) -> Result<SampleIndex, AgentError> {
        Ok(self.most_behind())
    }

    fn tell(&mut self, sample: SampleIndex, _quality: Quality) {
        if let Some(shots) = self.shots.get_mut(sample) {
            *shots += 1;
            self.total_shots += 1;
        }
    }
}
