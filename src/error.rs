//! Error types for blockscan

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for blockscan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scanner library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Device path does not exist
    #[error("Device not found: {0}")]
    NotFound(PathBuf),

    /// Path exists but is not a block device
    #[error("Not a block device: {0}")]
    NotABlockDevice(PathBuf),

    /// Insufficient permissions for the device
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Opening the device for scanning failed
    #[error("Failed to open device {path}: {source}")]
    DeviceOpen {
        /// Device path
        path: PathBuf,
        /// Underlying open error
        source: io::Error,
    },

    /// Invalid scan parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Latency taxonomy configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Map an `io::Error` observed while statting `path` to the matching
    /// probe error kind.
    pub(crate) fn from_device_io(path: &std::path::Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_path_buf()),
            _ => Error::Io(err),
        }
    }
}
