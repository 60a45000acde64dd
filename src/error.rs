// Error types for the engine runtime
// Connection faults and subscriber panics are logged, not returned; these
// enums cover the failures a caller can actually act on.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for event hub operations
pub type HubResult<T> = Result<T, HubError>;

/// Result type for network operations
pub type NetResult<T> = Result<T, NetError>;

/// Result type for settings loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Event hub errors
#[derive(Debug, Error)]
pub enum HubError {
    /// A topic keeps the payload type it was first registered with
    #[error("topic `{topic}` carries `{existing}`, requested as `{requested}`")]
    TopicTypeMismatch {
        topic: String,
        existing: &'static str,
        requested: &'static str,
    },
}

/// Network transport and codec errors
#[derive(Debug, Error)]
pub enum NetError {
    #[error("invalid address `{0}`")]
    InvalidAddress(String),

    #[error("network I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("transport not connected")]
    NotConnected,

    #[error("transport closed")]
    Closed,
}

/// Settings loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Top-level engine error
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Hub(#[from] HubError),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
