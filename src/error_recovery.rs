//! Bounded retry for failed shots.
//
// A failed acquisition is retried on the same sample before the loop gives
// up on the run. Retries happen here, below the loop, so a transient fault
// that clears on retry never reaches the caller and never costs extra budget.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::error::MeasurementError;
use crate::measurement::{Acquisition, Quality, SampleIndex};

/// Defines a policy for retrying a failed measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// The delay between attempts.
    #[serde(default, rename = "backoff_ms", with = "millis")]
    pub backoff_delay: Duration,
}

fn default_max_retries() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Give up on the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            backoff_delay: Duration::ZERO,
        }
    }

    /// First attempt plus retries.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Measure `sample`, retrying the same sample according to `policy`.
///
/// `on_failure` is called once for every failed attempt, including the last.
/// Returns the last error if every attempt fails.
pub async fn measure_with_retry<A, F>(
    acquisition: &mut A,
    sample: SampleIndex,
    policy: &RetryPolicy,
    mut on_failure: F,
) -> Result<Quality, MeasurementError>
where
    A: Acquisition + ?Sized,
    F: FnMut(&MeasurementError),
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match acquisition.measure(sample).await {
            Ok(quality) => return Ok(quality),
            Err(err) => {
                on_failure(&err);
                if attempt >= policy.max_attempts() {
                    return Err(err);
                }
                tracing::warn!(
                    sample,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    error = %err,
                    "Measurement failed, retrying same sample"
                );
                if !policy.backoff_delay.is_zero() {
                    sleep(policy.backoff_delay).await;
                }
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Flaky {
        calls: u32,
        succeed_on_attempt: u32,
    }

    #[async_trait]
    impl Acquisition for Flaky {
        async fn measure(&mut self, sample: SampleIndex) -> Result<Quality, MeasurementError> {
            self.calls += 1;
            if self.calls >= self.succeed_on_attempt {
                Ok(0.25)
            } else {
                Err(MeasurementError::Hardware {
                    sample,
                    reason: "beam dump".into(),
                })
            }
        }
    }

    #[tokio::test]
    async fn test_retry_logic_succeeds() {
        let mut flaky = Flaky {
            calls: 0,
            succeed_on_attempt: 2,
        };
        let mut failures = 0;
        let result =
            measure_with_retry(&mut flaky, 3, &RetryPolicy::default(), |_| failures += 1).await;
        assert_eq!(result, Ok(0.25));
        assert_eq!(flaky.calls, 2);
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn test_retry_logic_fails() {
        let mut flaky = Flaky {
            calls: 0,
            succeed_on_attempt: 3,
        };
        let mut failures = 0;
        let result =
            measure_with_retry(&mut flaky, 3, &RetryPolicy::default(), |_| failures += 1).await;
        assert!(result.is_err());
        assert_eq!(flaky.calls, 2);
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn test_no_retry() {
        let mut flaky = Flaky {
            calls: 0,
            succeed_on_attempt: 2,
        };
        let result = measure_with_retry(&mut flaky, 0, &RetryPolicy::no_retry(), |_| {}).await;
        assert!(result.is_err());
        assert_eq!(flaky.calls, 1);
    }

    #[test]
    fn test_policy_from_toml() {
        let policy: RetryPolicy = toml::from_str("backoff_ms = 250").unwrap();
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.backoff_delay, Duration::from_millis(250));
    }
}
