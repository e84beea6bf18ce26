#![forbid(unsafe_code)]

//! The ingestion pipe.
//!
//! A pipe wraps exactly one response body. Bytes come out in arrival order
//! with no gaps. A pipe cannot be rewound: starting over means opening a new
//! one through [`PipeSource`]. Failures are returned as they are; nothing here
//! retries.

use std::{fmt, sync::Arc};

use bytes::Bytes;
use futures::StreamExt;
use tapedeck_net::{ByteStream, Headers, Net, NetError, NetResult, RangeSpec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Everything needed to open pipes for one remote asset.
#[derive(Clone)]
pub struct PipeSource {
    net: Arc<dyn Net>,
    url: Url,
    headers: Option<Headers>,
    cancel: CancellationToken,
}

impl fmt::Debug for PipeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeSource")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl PipeSource {
    pub fn new(net: Arc<dyn Net>, url: Url, cancel: CancellationToken) -> Self {
        Self {
            net,
            url,
            headers: None,
            cancel,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Opens the asset from byte 0.
    pub async fn open(&self) -> NetResult<IngestionPipe> {
        IngestionPipe::open(self.net.as_ref(), &self.url, self.headers.clone(), &self.cancel)
            .await
    }

    /// Opens the asset at `range.start`.
    pub async fn open_at(&self, range: RangeSpec) -> NetResult<IngestionPipe> {
        IngestionPipe::open_at(
            self.net.as_ref(),
            &self.url,
            range,
            self.headers.clone(),
            &self.cancel,
        )
        .await
    }
}

/// One ordered body stream.
pub struct IngestionPipe {
    stream: ByteStream,
    start_offset: u64,
    total_length: Option<u64>,
    bytes_received: u64,
    ended: bool,
    cancel: CancellationToken,
}

impl fmt::Debug for IngestionPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionPipe")
            .field("start_offset", &self.start_offset)
            .field("total_length", &self.total_length)
            .field("bytes_received", &self.bytes_received)
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}

impl IngestionPipe {
    /// Begins sequential retrieval from byte 0.
    pub async fn open(
        net: &dyn Net,
        url: &Url,
        headers: Option<Headers>,
        cancel: &CancellationToken,
    ) -> NetResult<Self> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(NetError::Cancelled),
            r = net.stream(url, headers) => r?,
        };
        debug!(%url, total = ?response.total_len, "ingestion opened");
        Ok(Self::from_parts(
            response.stream,
            response.offset,
            response.total_len,
            cancel.clone(),
        ))
    }

    /// Begins retrieval at `range.start` through a ranged request.
    pub async fn open_at(
        net: &dyn Net,
        url: &Url,
        range: RangeSpec,
        headers: Option<Headers>,
        cancel: &CancellationToken,
    ) -> NetResult<Self> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(NetError::Cancelled),
            r = net.get_range(url, range, headers) => r?,
        };
        if response.offset != range.start {
            return Err(NetError::RangeNotSatisfied {
                status: 200,
                url: url.to_string(),
            });
        }
        debug!(%url, start = range.start, end = ?range.end, total = ?response.total_len, "ranged ingestion opened");
        Ok(Self::from_parts(
            response.stream,
            response.offset,
            response.total_len,
            cancel.clone(),
        ))
    }

    pub fn from_parts(
        stream: ByteStream,
        start_offset: u64,
        total_length: Option<u64>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream,
            start_offset,
            total_length,
            bytes_received: 0,
            ended: false,
            cancel,
        }
    }

    /// Next non-empty chunk, `None` at end of stream.
    ///
    /// Returns `NetError::Cancelled` as soon as the session is torn down,
    /// even while suspended waiting for data.
    pub async fn next_chunk(&mut self) -> NetResult<Option<Bytes>> {
        loop {
            if self.ended {
                return Ok(None);
            }
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.ended = true;
                    return Err(NetError::Cancelled);
                }
                next = self.stream.next() => next,
            };
            match next {
                None => {
                    self.ended = true;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.ended = true;
                    return Err(e);
                }
                Some(Ok(bytes)) if bytes.is_empty() => {
                    warn!(offset = self.position(), "empty chunk from source");
                }
                Some(Ok(bytes)) => {
                    self.bytes_received += bytes.len() as u64;
                    return Ok(Some(bytes));
                }
            }
        }
    }

    /// Length of the whole asset, if the source reported it.
    pub fn total_length(&self) -> Option<u64> {
        self.total_length
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Asset offset of the first byte this pipe delivers.
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Asset offset of the next byte this pipe will deliver.
    pub fn position(&self) -> u64 {
        self.start_offset + self.bytes_received
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;
    use rstest::rstest;

    use super::*;

    fn pipe_of(chunks: Vec<NetResult<Bytes>>, total: Option<u64>) -> IngestionPipe {
        IngestionPipe::from_parts(
            Box::pin(stream::iter(chunks)),
            0,
            total,
            CancellationToken::new(),
        )
    }

    #[rstest]
    #[timeout(Duration::from_secs(2))]
    #[tokio::test]
    async fn counts_received_bytes_and_skips_empty_chunks() {
        let mut pipe = pipe_of(
            vec![
                Ok(Bytes::from_static(b"abc")),
                Ok(Bytes::new()),
                Ok(Bytes::from_static(b"de")),
            ],
            Some(5),
        );

        assert_eq!(pipe.next_chunk().await.unwrap().unwrap(), "abc");
        assert_eq!(pipe.next_chunk().await.unwrap().unwrap(), "de");
        assert_eq!(pipe.next_chunk().await.unwrap(), None);
        assert_eq!(pipe.bytes_received(), 5);
        assert_eq!(pipe.total_length(), Some(5));
        assert_eq!(pipe.next_chunk().await.unwrap(), None);
    }

    #[rstest]
    #[timeout(Duration::from_secs(2))]
    #[tokio::test]
    async fn error_ends_the_pipe() {
        let mut pipe = pipe_of(
            vec![
                Ok(Bytes::from_static(b"abc")),
                Err(NetError::http("reset")),
                Ok(Bytes::from_static(b"never")),
            ],
            None,
        );

        pipe.next_chunk().await.unwrap();
        assert_eq!(pipe.next_chunk().await, Err(NetError::http("reset")));
        assert_eq!(pipe.next_chunk().await, Ok(None));
        assert_eq!(pipe.position(), 3);
    }

    #[rstest]
    #[timeout(Duration::from_secs(2))]
    #[tokio::test]
    async fn cancel_unblocks_pending_chunk() {
        let cancel = CancellationToken::new();
        let mut pipe = IngestionPipe::from_parts(
            Box::pin(stream::pending::<NetResult<Bytes>>()),
            0,
            None,
            cancel.clone(),
        );

        let waiter = tokio::spawn(async move { pipe.next_chunk().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(NetError::Cancelled));
    }
}
