//! Log output initialization.

use tracing_subscriber::EnvFilter;

/// Errors installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("a global subscriber is already installed")]
    AlreadyInstalled,
}

/// Build the log filter. `RUST_LOG` wins over `level`; without either
/// everything at `info` and above is shown.
pub fn log_filter(level: Option<&str>) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    Ok(EnvFilter::try_new(level.unwrap_or("info"))?)
}

/// Install the `fmt` subscriber for the process.
pub fn init_logging(level: Option<&str>) -> Result<(), LoggingError> {
    let filter = log_filter(level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInstalled)
}
