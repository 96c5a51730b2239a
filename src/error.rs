//! Error types for the service liveness registry.

use thiserror::Error;

/// Errors surfaced by the key-value substrate layer
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("Substrate unavailable: {0}")]
    Unavailable(String),

    #[error("Lease not found")]
    LeaseNotFound,

    #[error("Watch history compacted at revision {compact_revision}")]
    Compacted { compact_revision: i64 },

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Registry-level errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transaction conflicted after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("Lease operation failed: {0}")]
    Lease(String),

    #[error("Watch gap: history compacted at revision {compact_revision}")]
    WatchGap { compact_revision: i64 },

    #[error("Substrate unavailable: {0}")]
    Unavailable(String),

    #[error("Record decode failed: {0}")]
    Codec(#[from] prost::DecodeError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<SubstrateError> for RegistryError {
    fn from(err: SubstrateError) -> Self {
        match err {
            SubstrateError::Compacted { compact_revision } => {
                RegistryError::WatchGap { compact_revision }
            }
            SubstrateError::LeaseNotFound => {
                RegistryError::Lease("lease no longer exists".to_string())
            }
            SubstrateError::Unavailable(message) => RegistryError::Unavailable(message),
            SubstrateError::Backend(message) => RegistryError::Unavailable(message),
        }
    }
}

impl From<config::ConfigError> for RegistryError {
    fn from(err: config::ConfigError) -> Self {
        RegistryError::Config(err.to_string())
    }
}
