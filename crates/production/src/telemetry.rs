//! Logging initialization.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to set global subscriber: {0}")]
    SetSubscriber(String),
}

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence; `default_filter` applies when it is unset.
/// Fails if a subscriber is already installed.
pub fn init_telemetry(default_filter: &str) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| TelemetryError::SetSubscriber(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(matches!(
                init_telemetry("info,[[["),
                Err(TelemetryError::Filter(_))
            ));
        }
    }
}
