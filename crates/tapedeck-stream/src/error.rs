#![forbid(unsafe_code)]

use tapedeck_net::NetError;
use tapedeck_storage::StorageError;
use thiserror::Error;

/// Failure of the pipe -> temp file loop.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("source stream error: {0}")]
    Source(#[source] NetError),

    #[error("temp file write error: {0}")]
    Sink(#[source] StorageError),

    #[error("offset overflowed u64")]
    OffsetOverflow,
}

impl WriterError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Source(NetError::Cancelled) | Self::Sink(StorageError::Cancelled)
        )
    }
}

/// Why a local copy did not reach its destination.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("ingestion failed: {0}")]
    Ingestion(#[from] WriterError),

    #[error("could not open ingestion: {0}")]
    Open(#[source] NetError),

    #[error("stream ended with {cursor} of {total} bytes")]
    Incomplete { cursor: u64, total: u64 },

    #[error("temp file has holes: {0:?}")]
    Holes(Vec<std::ops::Range<u64>>),

    #[error("promotion failed: {0}")]
    Promote(#[source] StorageError),
}
