//! The unified error type for every fallible operation in this crate.

use std::path::PathBuf;

use thiserror::Error;

/// Why a URL failed to decode. Nested inside [`BundleError::UrlDecode`]
/// rather than flattened, since it is produced by the pure `url_codec`
/// extractor before any filesystem access happens.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum UrlError {
    /// The URL had no `.` separator, or fewer than four `/`-delimited
    /// numeric fields to the right of the prefix.
    #[error("malformed url: {0}")]
    Malformed(String),

    /// One of the four numeric fields was not a valid base-62 token.
    #[error("invalid base62 field: {0}")]
    Base62(String),

    /// The decoded hash did not match the hash of the reconstructed
    /// canonical string.
    #[error("hash mismatch")]
    HashMismatch,
}

/// The primary error type for all operations in the `bundlestore` crate.
#[derive(Debug, Error)]
pub enum BundleError {
    /// An argument was structurally invalid: an empty URL, or a caller
    /// buffer too small to hold the fixed-size user-data field.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// URL parsing or hash verification failed.
    #[error("url decode failed: {0}")]
    UrlDecode(#[from] UrlError),

    /// The bundle file a read or write expected to find was missing.
    #[error("bundle file not found: {path}")]
    NotFound { path: PathBuf },

    /// An I/O error occurred, including bundle header validation failures
    /// (bad magic, version, or flag) and short reads/writes.
    #[error("I/O error on '{path}': {source}")]
    Io { source: std::io::Error, path: PathBuf },

    /// A directory or bundle file could not be created.
    #[error("resource error: {message}")]
    Resource { message: String },
}

impl BundleError {
    pub(crate) fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        BundleError::Io { source, path: path.into() }
    }

    pub(crate) fn not_found(path: impl Into<PathBuf>) -> Self {
        BundleError::NotFound { path: path.into() }
    }

    pub(crate) fn resource(message: impl Into<String>) -> Self {
        BundleError::Resource { message: message.into() }
    }
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, BundleError>;
