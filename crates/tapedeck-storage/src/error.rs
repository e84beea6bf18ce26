#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

/// Result type used by `tapedeck-storage`.
pub type StorageResult<T> = Result<T, StorageError>;

/// Local filesystem failures.
///
/// Higher-level crates wrap this error when they need session context.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("destination parent directory missing: {0}")]
    MissingParent(PathBuf),

    #[error("invalid range: start {start} >= end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("temp file abandoned: {0}")]
    Abandoned(String),

    #[error("temp file already complete")]
    AlreadyComplete,

    #[error("operation cancelled")]
    Cancelled,
}
