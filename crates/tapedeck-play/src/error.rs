#![forbid(unsafe_code)]

use tapedeck_storage::StorageError;

/// The renderer could not take the asset.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AssetError {
    #[error("asset rejected: {reason}")]
    Rejected { reason: String },

    #[error("renderer already attached")]
    AlreadyAttached,

    #[error("renderer released")]
    Released,

    #[error("cannot open media input: {0}")]
    Input(#[from] StorageError),
}

impl AssetError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}
