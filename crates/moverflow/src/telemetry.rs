//! Logging setup.
//!
//! The storage layer logs through `log`, the dispatcher and ingestion
//! through `tracing`. `log` records are forwarded into the tracing
//! subscriber so both end up in the same output.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSection;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to install log bridge: {0}")]
    LogBridge(#[from] log::SetLoggerError),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Builds the filter: `RUST_LOG` wins over the configured level.
fn build_filter(level: &str) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| TelemetryError::InvalidFilter {
            filter: level.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Installs the global subscriber. Call once, early in `main`.
pub fn init_logging(settings: &LoggingSection) -> Result<(), TelemetryError> {
    let filter = build_filter(&settings.level)?;

    tracing_log::LogTracer::init()?;

    if settings.json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true));
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true));
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_levels() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("info,moverflow=trace").is_ok());
    }

    #[test]
    fn test_build_filter_rejects_garbage() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        assert!(matches!(
            build_filter("info,moverflow=loud"),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }
}
