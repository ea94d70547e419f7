//! Error types for the configuration store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the configuration store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to find config file '{path}'")]
    PathNotFound { path: PathBuf },

    #[error("Failed to read config file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseFailed { message: String },

    #[error("Failed to serialize config: {message}")]
    SerializeFailed { message: String },

    #[error("Config validation failed with {error_count} error(s)")]
    ValidationFailed { error_count: usize, report: String },

    #[error("configuration is read-only")]
    ReadOnly,

    #[error("Failed to watch config file '{path}': {source}")]
    WatchUnavailable {
        path: PathBuf,
        source: notify::Error,
    },
}

impl StoreError {
    /// Returns true for read and write failures on the backing file.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::ReadFailed { .. } | Self::WriteFailed { .. })
    }

    /// Returns true when the stored bytes or the value could not be (de)serialized.
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::ParseFailed { .. } | Self::SerializeFailed { .. })
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
