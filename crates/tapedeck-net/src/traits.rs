use std::{fmt, pin::Pin};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use url::Url;

use crate::{
    error::NetResult,
    types::{Headers, RangeSpec},
};

pub type ByteStream = Pin<Box<dyn Stream<Item = NetResult<Bytes>> + Send>>;

/// An open response body.
pub struct ByteResponse {
    /// Byte offset of the first body byte within the asset.
    pub offset: u64,
    /// Length of the whole asset, when the server reported it.
    pub total_len: Option<u64>,
    pub stream: ByteStream,
}

impl fmt::Debug for ByteResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteResponse")
            .field("offset", &self.offset)
            .field("total_len", &self.total_len)
            .finish_non_exhaustive()
    }
}

/// Source of ordered asset bytes.
#[async_trait]
pub trait Net: Send + Sync {
    /// Open the whole asset from byte 0.
    async fn stream(&self, url: &Url, headers: Option<Headers>) -> NetResult<ByteResponse>;

    /// Open the asset at `range.start`. Implementations must fail rather than
    /// return bytes from a different offset.
    async fn get_range(
        &self,
        url: &Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> NetResult<ByteResponse>;
}
