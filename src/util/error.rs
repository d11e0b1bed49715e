//! Error types for the wt5 library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for store and collection operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Backing store could not be opened or created
    #[error("Storage unavailable at {path}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Child or group not found by name
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Positional access beyond the item list
    #[error("Index {index} out of range (count: {count})")]
    IndexOutOfRange { index: usize, count: usize },

    /// Operation deliberately left unimplemented
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// Persisted item list disagrees with the store contents
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    /// Child name is empty or contains a path separator
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    /// Child name already present in the item list
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// Store was closed; only close() is valid afterwards
    #[error("Store is closed: {0}")]
    Closed(PathBuf),

    /// Flush during close failed; the handle was released anyway
    #[error("Close failed for {path}: {source}")]
    CloseFailed {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Invalid magic bytes at start of file
    #[error("Invalid store file: expected WTree magic bytes")]
    InvalidMagic,

    /// Unsupported file format version
    #[error("Unsupported store format version: {0}")]
    UnsupportedVersion(u16),

    /// File is truncated or corrupted
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// Invalid data structure in file
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// Type mismatch when reading data
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create a type mismatch error.
    pub fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Wrap an error raised while opening the store at `path`.
    pub fn unavailable(path: impl Into<PathBuf>, source: Error) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// Result type alias for wt5 operations.
pub type Result<T> = std::result::Result<T, Error>;
