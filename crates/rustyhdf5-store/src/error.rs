//! Error type for store primitives.

use std::fmt;
use std::io;

/// Failure category reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No link, container or attribute at the requested location.
    NotFound,
    /// A link, container or attribute already exists at the location.
    AlreadyExists,
    /// The handle id is unknown, closed, or of the wrong kind.
    BadHandle,
    /// Mutation attempted through a read-only handle.
    ReadOnly,
    /// Malformed argument (bad name, rank disagreement, buffer size).
    InvalidArgument,
    /// Selection or resize outside the dataspace bounds.
    OutOfBounds,
    /// The container is in use and cannot be truncated or recreated.
    Busy,
    /// Filesystem failure.
    Io,
    /// A container image could not be decoded.
    Corrupt,
}

impl ErrorCode {
    /// Stable negative numeric code, in the manner of native library status values.
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::NotFound => -2,
            ErrorCode::AlreadyExists => -3,
            ErrorCode::BadHandle => -4,
            ErrorCode::ReadOnly => -5,
            ErrorCode::InvalidArgument => -6,
            ErrorCode::OutOfBounds => -7,
            ErrorCode::Busy => -8,
            ErrorCode::Io => -9,
            ErrorCode::Corrupt => -10,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::NotFound => "not found",
            ErrorCode::AlreadyExists => "already exists",
            ErrorCode::BadHandle => "bad handle",
            ErrorCode::ReadOnly => "read-only",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::OutOfBounds => "out of bounds",
            ErrorCode::Busy => "busy",
            ErrorCode::Io => "I/O failure",
            ErrorCode::Corrupt => "corrupt image",
        };
        f.write_str(s)
    }
}

/// Error returned by every [`crate::ObjectStore`] primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// Failure category.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl StoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(what: impl fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("no object at '{what}'"))
    }

    pub(crate) fn bad_handle(hid: i64) -> Self {
        Self::new(ErrorCode::BadHandle, format!("invalid handle {hid}"))
    }

    pub(crate) fn read_only(what: impl fmt::Display) -> Self {
        Self::new(ErrorCode::ReadOnly, format!("{what}: container opened read-only"))
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store error {} ({}): {}", self.code.code(), self.code, self.message)
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        let code = match e.kind() {
            io::ErrorKind::NotFound => ErrorCode::NotFound,
            io::ErrorKind::AlreadyExists => ErrorCode::AlreadyExists,
            _ => ErrorCode::Io,
        };
        StoreError::new(code, e.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::new(ErrorCode::Corrupt, e.to_string())
    }
}

/// Result alias for store primitives.
pub type Result<T> = std::result::Result<T, StoreError>;
