//! Configuration System using Figment
//!
//! Configuration is loaded from (in order of precedence, highest first):
//! 1. Environment variables prefixed with `BEAMLINE_`
//! 2. TOML configuration file (default: `config/beamline.toml`)
//! 3. Built-in defaults
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! BEAMLINE_APPLICATION__LOG_LEVEL=debug
//! BEAMLINE_EXPERIMENT__MAX_SHOTS=90
//! BEAMLINE_AGENT__KIND=chaos
//! BEAMLINE_AGENT__SEED=7
//! ```
//!
//! # Example
//!
//! ```no_run
//! use adaptive_beamline::config::BeamlineConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BeamlineConfig::load()?;
//!     println!("Samples: {}", config.experiment.sample_count);
//!     println!("Agent: {}", config.agent.kind());
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::{Agent, AgentConfig};
use crate::error::{AgentError, AppResult};
use crate::error_recovery::RetryPolicy;
use crate::experiment::AdaptiveLoop;
use crate::hardware::SimulatedBeamline;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/beamline.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "BEAMLINE_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider failed to parse or extract.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    /// Values parsed but are inconsistent.
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BeamlineConfig {
    /// `[application]`: name and logging.
    pub application: ApplicationConfig,
    /// `[experiment]`: sample count and shot budget.
    pub experiment: ExperimentConfig,
    /// `[agent]`: which agent drives the run.
    pub agent: AgentConfig,
    /// `[retry]`: per-shot retry policy.
    pub retry: RetryPolicy,
    /// `[simulation]`: the simulated beamline.
    pub simulation: SimulationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Recorded in each run's start document.
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line format.
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "adaptive-beamline".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Run shape: how many samples and how many shots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Samples loaded on the changer.
    pub sample_count: usize,
    /// Shot budget for the run.
    pub max_shots: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            sample_count: 9,
            max_shots: 25,
        }
    }
}

/// Simulated beamline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Ground-truth scattering strength per sample. Empty means a linear
    /// spread from 1.0 down to 0.1 across the samples.
    pub strengths: Vec<f64>,
    /// Exposure plus readout time per shot in milliseconds
    pub exposure_ms: u64,
    /// Sample changer travel time per slot in milliseconds
    pub move_ms: u64,
    /// Relative noise amplitude on each shot
    pub noise: f64,
    /// Seed for the detector noise.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            strengths: Vec::new(),
            exposure_ms: 0,
            move_ms: 0,
            noise: 0.05,
            seed: 0,
        }
    }
}

impl SimulationConfig {
    /// Strengths for `sample_count` samples, filling in the default spread.
    pub fn resolved_strengths(&self, sample_count: usize) -> Vec<f64> {
        if !self.strengths.is_empty() {
            return self.strengths.clone();
        }
        let span = sample_count.saturating_sub(1).max(1) as f64;
        (0..sample_count)
            .map(|i| 1.0 - 0.9 * i as f64 / span)
            .collect()
    }

    /// Simulated beamline for `sample_count` samples.
    pub fn build_beamline(&self, sample_count: usize) -> SimulatedBeamline {
        SimulatedBeamline::new(self.resolved_strengths(sample_count))
            .with_noise(self.noise)
            .with_seed(self.seed)
            .with_exposure_time(Duration::from_millis(self.exposure_ms))
            .with_move_time(Duration::from_millis(self.move_ms))
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl BeamlineConfig {
    /// Load configuration from `config/beamline.toml` and environment variables.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path, then validate it.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(BeamlineConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - At least one sample
    /// - Oracle and simulation strengths, when given, match the sample count
    ///   and are positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let sample_count = self.experiment.sample_count;
        if sample_count == 0 {
            return Err(ConfigError::ValidationError(
                "experiment.sample_count must be at least 1".to_string(),
            ));
        }

        if let AgentConfig::Oracle { strengths } = &self.agent {
            if !strengths.is_empty() {
                check_strengths("agent.strengths", strengths, sample_count)?;
            }
        }
        if !self.simulation.strengths.is_empty() {
            check_strengths("simulation.strengths", &self.simulation.strengths, sample_count)?;
        }

        if !(self.simulation.noise.is_finite() && self.simulation.noise >= 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "simulation.noise must be a non-negative number, got {}",
                self.simulation.noise
            )));
        }

        Ok(())
    }

    /// Agent selection with an empty oracle strength list filled in from the
    /// simulation's ground truth.
    pub fn resolved_agent(&self) -> AgentConfig {
        match &self.agent {
            AgentConfig::Oracle { strengths } if strengths.is_empty() => AgentConfig::Oracle {
                strengths: self
                    .simulation
                    .resolved_strengths(self.experiment.sample_count),
            },
            other => other.clone(),
        }
    }

    /// Build the configured agent.
    pub fn build_agent(&self) -> Result<Box<dyn Agent>, AgentError> {
        self.resolved_agent().build(self.experiment.sample_count)
    }

    /// Build the simulated beamline.
    pub fn build_beamline(&self) -> SimulatedBeamline {
        self.simulation.build_beamline(self.experiment.sample_count)
    }

    /// Validate, then assemble a ready-to-run loop against the simulated
    /// beamline.
    pub fn build_loop(&self) -> AppResult<AdaptiveLoop<Box<dyn Agent>, SimulatedBeamline>> {
        self.validate()?;
        let adaptive = AdaptiveLoop::new(
            self.build_agent()?,
            self.experiment.sample_count,
            self.experiment.max_shots,
            self.build_beamline(),
        )?
        .with_retry_policy(self.retry.clone())
        .with_metadata("application", &self.application.name);
        Ok(adaptive)
    }
}

fn check_strengths(field: &str, strengths: &[f64], sample_count: usize) -> Result<(), ConfigError> {
    if strengths.len() != sample_count {
        return Err(ConfigError::ValidationError(format!(
            "{field} has {} entries but experiment.sample_count is {sample_count}",
            strengths.len()
        )));
    }
    if strengths.iter().any(|s| !s.is_finite() || *s <= 0.0) {
        return Err(ConfigError::ValidationError(format!(
            "{field} must all be positive"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentKind;
    use crate::error::BeamlineError;
    use serial_test::serial;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_validate() {
        let config = BeamlineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.experiment.sample_count, 9);
        assert_eq!(config.experiment.max_shots, 25);
        assert_eq!(config.agent, AgentConfig::RoundRobin);
        assert_eq!(config.retry.max_retries, 1);
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let file = write_config(
            r#"
            [application]
            log_level = "debug"
            log_format = "json"

            [experiment]
            sample_count = 3
            max_shots = 12

            [agent]
            kind = "oracle"
            strengths = [1.0, 0.5, 0.25]

            [retry]
            backoff_ms = 10
            "#,
        );

        let config = BeamlineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_format, LogFormat::Json);
        assert_eq!(config.experiment.sample_count, 3);
        assert_eq!(
            config.agent,
            AgentConfig::Oracle {
                strengths: vec![1.0, 0.5, 0.25]
            }
        );
        assert_eq!(config.retry.backoff_delay, Duration::from_millis(10));
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let config = BeamlineConfig::load_from("/no/such/beamline.toml").unwrap();
        assert_eq!(config.experiment.sample_count, 9);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = write_config(
            r#"
            [experiment]
            sample_count = 4
            max_shots = 8
            "#,
        );

        std::env::set_var("BEAMLINE_EXPERIMENT__MAX_SHOTS", "40");
        std::env::set_var("BEAMLINE_AGENT__KIND", "chaos");
        std::env::set_var("BEAMLINE_AGENT__SEED", "11");
        let result = BeamlineConfig::load_from(file.path());
        std::env::remove_var("BEAMLINE_EXPERIMENT__MAX_SHOTS");
        std::env::remove_var("BEAMLINE_AGENT__KIND");
        std::env::remove_var("BEAMLINE_AGENT__SEED");

        let config = result.unwrap();
        assert_eq!(config.experiment.sample_count, 4);
        assert_eq!(config.experiment.max_shots, 40);
        assert_eq!(config.agent, AgentConfig::Chaos { seed: Some(11) });
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let mut config = BeamlineConfig::default();
        config.application.log_level = "loud".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rejects_strength_mismatch() {
        let mut config = BeamlineConfig::default();
        config.agent = AgentConfig::Oracle {
            strengths: vec![1.0, 2.0],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oracle_uses_simulation_truth() {
        let mut config = BeamlineConfig::default();
        config.experiment.sample_count = 3;
        config.simulation.strengths = vec![2.0, 1.0, 0.5];
        config.agent = AgentConfig::Oracle { strengths: vec![] };

        assert_eq!(
            config.resolved_agent(),
            AgentConfig::Oracle {
                strengths: vec![2.0, 1.0, 0.5]
            }
        );
        assert!(config.build_agent().is_ok());
    }

    #[test]
    #[serial]
    fn test_oracle_without_strengths_loads() {
        let file = write_config(
            r#"
            [experiment]
            sample_count = 3

            [agent]
            kind = "oracle"
            "#,
        );

        let config = BeamlineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.agent, AgentConfig::Oracle { strengths: vec![] });
        assert_eq!(config.build_agent().unwrap().kind(), AgentKind::Oracle);
    }

    #[test]
    #[serial]
    fn test_oracle_selected_from_env() {
        std::env::set_var("BEAMLINE_AGENT__KIND", "oracle");
        let result = BeamlineConfig::load_from("/no/such/beamline.toml");
        std::env::remove_var("BEAMLINE_AGENT__KIND");

        assert_eq!(
            result.unwrap().agent,
            AgentConfig::Oracle { strengths: vec![] }
        );
    }

    #[tokio::test]
    async fn test_build_loop_runs() {
        let mut config = BeamlineConfig::default();
        config.experiment.sample_count = 3;
        config.experiment.max_shots = 6;
        config.agent = AgentConfig::Oracle { strengths: vec![] };

        let mut adaptive = config.build_loop().unwrap();
        assert_eq!(adaptive.agent_kind(), AgentKind::Oracle);
        let report = adaptive.run().await.unwrap();
        assert!(report.status.is_success());
        assert_eq!(report.trace.len(), 6);
    }

    #[test]
    fn test_build_loop_reports_setup_errors() {
        let mut config = BeamlineConfig::default();
        config.experiment.sample_count = 0;
        assert!(matches!(
            config.build_loop(),
            Err(BeamlineError::Config(ConfigError::ValidationError(_)))
        ));

        let mut config = BeamlineConfig::default();
        config.agent = AgentConfig::Learned {
            model_path: "/no/such/policy.json".into(),
        };
        assert!(matches!(
            config.build_loop(),
            Err(BeamlineError::Agent(AgentError::ModelLoad { .. }))
        ));
    }

    #[test]
    fn test_default_strength_spread() {
        let strengths = SimulationConfig::default().resolved_strengths(4);
        assert_eq!(strengths.len(), 4);
        assert!((strengths[0] - 1.0).abs() < 1e-12);
        assert!((strengths[3] - 0.1).abs() < 1e-12);

        assert_eq!(SimulationConfig::default().resolved_strengths(1), vec![1.0]);
    }
}
