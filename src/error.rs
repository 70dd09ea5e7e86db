//! Error types for price_tracker

use thiserror::Error;

/// A scraped price string that could not be turned into a decimal amount
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceParseError {
    /// The currency prefix was not found in the raw string
    #[error("missing currency prefix in price {0:?}")]
    MissingPrefix(String),
    /// The text after the prefix is not a decimal number
    #[error("invalid amount in price {0:?}")]
    InvalidAmount(String),
    /// Prices below zero are never valid
    #[error("negative amount in price {0:?}")]
    Negative(String),
}

/// The uploaded snapshot container could not be read
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Not a readable ZIP archive
    #[error("invalid ZIP archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    /// The archive has no manifest entry
    #[error("{0} not found in archive")]
    MissingManifest(&'static str),
    /// The manifest is present but does not decode
    #[error("failed to parse manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    /// An image entry is larger than the accepted limit
    #[error("image {key} is too large ({size} bytes)")]
    ImageTooLarge { key: String, size: u64 },
    /// Reading an archive entry failed
    #[error("failed to read archive entry: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence layer failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// A stored value could not be decoded back into its domain type
    #[error("invalid stored value in {column}: {value:?}")]
    InvalidValue { column: &'static str, value: String },
}

/// Unified error type for price_tracker operations
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Snapshot upload was malformed
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// Store operation failed
    #[error(transparent)]
    Store(#[from] StoreError),
    /// HTTP request failed (network error, timeout, etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP error status code returned by the tracker server
    #[error("HTTP error: {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to serialize or parse JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for TrackerError {
    fn from(err: rusqlite::Error) -> Self {
        TrackerError::Store(StoreError::Database(err))
    }
}

/// Result alias for price_tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Result alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
