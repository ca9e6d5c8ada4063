use std::{io, path::PathBuf};

use thiserror::Error;

/// Failure of the primary (local) store. Always surfaced to the caller.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode collection: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Failure of the optional remote mirror. Logged, never returned to clients.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("mirror request failed: {0}")]
    Transport(String),
    #[error("mirror returned status {0}")]
    Status(u16),
    #[error("mirror returned undecodable body: {0}")]
    Decode(String),
}

/// Request-level errors. Each variant maps to one HTTP status.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Conflict(String),
    #[error("invalid name or password")]
    Unauthorized,
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InvalidInput(message.into())
    }
}
