//! Error types for the binding layer.

use rustyhdf5_store::{ErrorCode, StoreError};

/// Errors that can occur while binding schemas or accessing bound nodes.
///
/// Every failure is surfaced to the caller; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Closed handle, read-only violation, or malformed multi-level create.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("rank mismatch: expected {expected}, got {actual}")]
    RankMismatch { expected: usize, actual: usize },

    /// Out-of-bounds index or resize beyond the maximum extent.
    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<u64>, actual: Vec<u64> },

    #[error("type mismatch: expected {expected}, stored {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Opaque failure reported by the backing store.
    #[error("backing store error {code}: {message}")]
    BackingStore { code: i32, message: String },
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e.code {
            ErrorCode::NotFound => Error::NotFound(e.message),
            ErrorCode::AlreadyExists => Error::AlreadyExists(e.message),
            ErrorCode::ReadOnly | ErrorCode::BadHandle => Error::InvalidState(e.message),
            ErrorCode::OutOfBounds => Error::IndexOutOfRange(e.message),
            code => Error::BackingStore {
                code: code.code(),
                message: e.message,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
