use fogwarden_core::FogError;
use thiserror::Error;

/// Failure talking to the backing store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Fog store unavailable: {0}")]
    Unavailable(String),
    #[error("Fog store rejected the request: {0}")]
    Rejected(String),
    #[error("Fog store did not answer in time")]
    Timeout,
    #[error("Could not decode stored fog: {0}")]
    Codec(String),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Grid(#[from] FogError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Invalid fog configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = core::result::Result<T, SyncError>;
