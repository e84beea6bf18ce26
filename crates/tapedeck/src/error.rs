#![forbid(unsafe_code)]

use std::{io, path::PathBuf};

use tapedeck_net::NetError;
use tapedeck_storage::StorageError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("destination directory {} is not writable: {source}", path.display())]
    DestinationNotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("destination {} has no file name", .0.display())]
    InvalidDestination(PathBuf),

    #[error("network client: {0}")]
    Net(#[from] NetError),

    #[error("temp storage: {0}")]
    Storage(#[from] StorageError),

    #[error("asset is not loaded")]
    NotLoaded,

    #[error("session destroyed")]
    Destroyed,
}

pub type SessionResult<T> = Result<T, SessionError>;
