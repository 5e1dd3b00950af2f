//! Error types at library boundaries

use std::path::PathBuf;
use thiserror::Error;

/// Invalid configuration. Raised at construction or load time, never per call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("token budget must be greater than zero")]
    InvalidTokenBudget,

    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange { field: String, value: f64, min: f64, max: f64 },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("invalid budget ratios: {0}")]
    InvalidRatios(String),

    #[error("invalid custom pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unsupported config extension '.{extension}' for file {}", path.display())]
    UnsupportedExtension { extension: String, path: PathBuf },

    #[error("failed reading config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

/// Failure of a single evidence provider. Contained by the pack builder.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external service failed: {0}")]
    Service(#[from] anyhow::Error),

    #[error("provider task aborted: {0}")]
    Join(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),
}
