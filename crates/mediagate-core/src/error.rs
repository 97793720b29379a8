//! Error types for `MediaGate` core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using `MediaGate` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `MediaGate` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings file could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Settings file is not valid JSON for [`crate::Config`]
    #[error("Failed to parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A resolved value is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tracing subscriber was already installed
    #[error("Failed to initialise tracing: {0}")]
    Tracing(String),
}
