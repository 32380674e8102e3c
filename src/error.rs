//! Error types for the monitor and session engine

use thiserror::Error;

/// Errors surfaced by the monitor.
///
/// Sampling and driver failures are normally swallowed inside the tick loop;
/// they only reach a caller through the explicit, on-demand paths
/// (`sample_now`, driver construction).
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Sampler error: {0}")]
    Sampler(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Histogram error: {0}")]
    Histogram(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, MonitorError>;
