//! Log output for test runs.
//!
//! The crate emits `tracing` events: listener lifecycle and dispatched
//! requests at `debug`, recorded assertion failures at `warn`, setup failures
//! at `error`. These helpers install a `tracing-subscriber` fmt layer that
//! writes through the test harness, so output is captured per test.
//!
//! # Example
//!
//! ```rust
//! use httpcheck::logging::init_test_logging;
//!
//! init_test_logging();
//! tracing::debug!("visible with --nocapture");
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{CheckError, CheckResult};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive (e.g., "debug", "httpcheck=debug,hyper=warn").
    pub level: String,

    /// Whether to output JSON lines instead of human-readable text.
    pub json_format: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "httpcheck=debug".to_string(),
            json_format: false,
            file_line_info: false,
            include_target: true,
        }
    }
}

/// Installs a global subscriber writing through the test harness.
///
/// # Errors
///
/// Returns `CheckError::Logging` if the filter is invalid or a global
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> CheckResult<()> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| CheckError::Logging(format!("invalid log level: {e}")))?;

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_test_writer()
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| CheckError::Logging(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| CheckError::Logging(e.to_string()))?;
    }

    Ok(())
}

/// Installs the default configuration once per process. Later calls, or a
/// subscriber installed elsewhere, are silently accepted.
pub fn init_test_logging() {
    // Every test calls this; only the first installation can succeed.
    let _ = init_logging(&LogConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, "httpcheck=debug");
        assert!(!config.json_format);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = LogConfig {
            level: "httpcheck=notalevel".to_string(),
            ..LogConfig::default()
        };
        assert!(matches!(init_logging(&config), Err(CheckError::Logging(_))));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::debug!("logging initialised twice without panicking");
    }
}
