//! # Error Types
//!
//! One error enum per layer. Lower layers are wrapped with `#[from]` so `?`
//! carries them upward unchanged.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot exists but is not a valid document.
    #[error("store snapshot {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broadcast to {target} failed: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced to the request layer by [`crate::service::DeviceService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("missing device_id")]
    MissingDeviceId,

    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ServiceError {
    /// True for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::MissingDeviceId
                | ServiceError::UnknownDevice(_)
                | ServiceError::BadRequest(_)
        )
    }
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownDevice(id) => ServiceError::UnknownDevice(id),
            RegistryError::Store(e) => ServiceError::Store(e),
        }
    }
}
