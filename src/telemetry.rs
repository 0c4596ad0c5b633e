//! Tracing Infrastructure
//!
//! Installs a global `tracing-subscriber` fmt subscriber driven by the
//! `[application]` config table.
//!
//! The configured `log_level` is the default filter; `RUST_LOG`, when set,
//! takes precedence so individual modules can be turned up:
//!
//! ```bash
//! RUST_LOG=adaptive_beamline::experiment=debug beamline run
//! ```

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ApplicationConfig, BeamlineConfig, LogFormat};

/// Build the filter for `log_level`, preferring `RUST_LOG` when present.
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// Initialize tracing from the application config.
///
/// # Errors
///
/// Fails if a global subscriber has already been installed.
pub fn init(app: &ApplicationConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = env_filter(&app.log_level);
    match app.log_format {
        LogFormat::Pretty => fmt().with_env_filter(filter).with_target(true).try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
    }
}

/// Initialize tracing from a full [`BeamlineConfig`].
///
/// # Errors
///
/// See [`init`].
pub fn init_from_config(
    config: &BeamlineConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init(&config.application)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_filter_from_level() {
        std::env::remove_var("RUST_LOG");
        let filter = env_filter("debug");
        assert_eq!(filter.to_string(), "debug");
    }
}
