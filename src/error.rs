//! Error types for the scan subscription registry.

use thiserror::Error;

/// Main error type for registry operations and its collaborators.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid SSID: {0}")]
    InvalidSsid(String),

    #[error("Subscription must target at least one SSID")]
    EmptyTargets,

    #[error("Peer is already dead")]
    PeerDead,

    #[error("Death hook not linked: {0}")]
    NotLinked(u64),

    #[error("Peer unreachable")]
    PeerUnreachable,

    #[error("Callback buffer full")]
    CallbackBufferFull,

    #[error("Registry service stopped")]
    ServiceStopped,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RegistryError {
    fn from(e: serde_json::Error) -> Self {
        RegistryError::Serialization(e.to_string())
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
