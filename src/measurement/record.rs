//! Running per-sample statistics.

use serde::{Deserialize, Serialize};

use super::Quality;

/// Shot count and running quality estimate for one sample.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Successful shots taken on this sample.
    pub shot_count: u64,
    /// Incremental mean of the observed badness signal.
    pub quality_estimate: Quality,
    /// Failed acquisition attempts, including ones that were retried.
    pub failures: u64,
}

impl MeasurementRecord {
    /// Fold one successful shot into the record.
    pub fn observe(&mut self, quality: Quality) {
        self.shot_count += 1;
        self.quality_estimate += (quality - self.quality_estimate) / self.shot_count as f64;
    }

    /// Count a failed acquisition attempt. Shot count is unaffected.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Whether at least one shot succeeded.
    #[must_use]
    pub fn is_measured(&self) -> bool {
        self.shot_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_mean() {
        let mut record = MeasurementRecord::default();
        for q in [2.0, 4.0, 6.0, 8.0] {
            record.observe(q);
        }
        assert_eq!(record.shot_count, 4);
        assert!((record.quality_estimate - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_first_observation_sets_estimate() {
        let mut record = MeasurementRecord::default();
        assert!(!record.is_measured());
        record.observe(0.37);
        assert!(record.is_measured());
        assert_eq!(record.quality_estimate, 0.37);
    }

    #[test]
    fn test_failure_does_not_count_as_shot() {
        let mut record = MeasurementRecord::default();
        record.record_failure();
        record.observe(1.0);
        assert_eq!(record.shot_count, 1);
        assert_eq!(record.failures, 1);
    }
}
