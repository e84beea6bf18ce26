//! In-memory [`Net`] with test-controlled chunk release.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tapedeck_net::{ByteResponse, Headers, Net, NetError, NetResult, RangeSpec};
use tokio::sync::Semaphore;
use url::Url;

/// Controls when chunks leave a [`ScriptedNet`] body.
#[derive(Clone)]
pub enum ChunkGate {
    /// Every chunk is available immediately.
    Open,
    /// One permit per chunk; see [`ScriptedNet::release`].
    Permits(Arc<Semaphore>),
}

#[derive(Clone)]
pub struct ScriptedNet {
    data: Arc<Vec<u8>>,
    chunk_size: usize,
    gate: ChunkGate,
    fail_after_chunks: Option<usize>,
    close_after_chunks: Option<usize>,
    report_total: bool,
    ranges: bool,
    fail_open: Option<NetError>,
    opened: Arc<Mutex<Vec<RangeSpec>>>,
}

impl ScriptedNet {
    #[must_use]
    pub fn new(data: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            data: Arc::new(data),
            chunk_size: chunk_size.max(1),
            gate: ChunkGate::Open,
            fail_after_chunks: None,
            close_after_chunks: None,
            report_total: true,
            ranges: true,
            fail_open: None,
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Chunks wait for [`release`](Self::release).
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gate = ChunkGate::Permits(Arc::new(Semaphore::new(0)));
        self
    }

    /// The first full-body response errors after `chunks` chunks.
    #[must_use]
    pub fn with_fail_after_chunks(mut self, chunks: usize) -> Self {
        self.fail_after_chunks = Some(chunks);
        self
    }

    /// The first full-body response ends cleanly after `chunks` chunks while
    /// still advertising the full length.
    #[must_use]
    pub fn with_close_after_chunks(mut self, chunks: usize) -> Self {
        self.close_after_chunks = Some(chunks);
        self
    }

    #[must_use]
    pub fn without_total(mut self) -> Self {
        self.report_total = false;
        self
    }

    #[must_use]
    pub fn without_ranges(mut self) -> Self {
        self.ranges = false;
        self
    }

    #[must_use]
    pub fn failing_open(mut self, error: NetError) -> Self {
        self.fail_open = Some(error);
        self
    }

    /// Let `chunks` more chunks through a gated net.
    pub fn release(&self, chunks: usize) {
        if let ChunkGate::Permits(sem) = &self.gate {
            sem.add_permits(chunks);
        }
    }

    /// Every request made so far, `bytes=0-` for full-body opens.
    #[must_use]
    pub fn opened(&self) -> Vec<RangeSpec> {
        self.opened.lock().clone()
    }

    fn body(
        &self,
        start: u64,
        end: u64,
        fail_after: Option<usize>,
        close_after: Option<usize>,
    ) -> ByteResponse {
        let data = Arc::clone(&self.data);
        let chunk_size = self.chunk_size;
        let gate = self.gate.clone();
        let stream = async_stream::stream! {
            let mut offset = start as usize;
            let mut sent = 0usize;
            while offset < end as usize {
                if close_after.is_some_and(|limit| sent >= limit) {
                    return;
                }
                if let ChunkGate::Permits(sem) = &gate {
                    match sem.acquire().await {
                        Ok(permit) => permit.forget(),
                        Err(_) => return,
                    }
                }
                if fail_after.is_some_and(|limit| sent >= limit) {
                    yield Err(NetError::http("connection reset by peer"));
                    return;
                }
                let next = (offset + chunk_size).min(end as usize);
                yield Ok(Bytes::copy_from_slice(&data[offset..next]));
                offset = next;
                sent += 1;
            }
        };
        ByteResponse {
            offset: start,
            total_len: self.report_total.then_some(self.data.len() as u64),
            stream: Box::pin(stream),
        }
    }
}

#[async_trait]
impl Net for ScriptedNet {
    async fn stream(&self, _url: &Url, _headers: Option<Headers>) -> NetResult<ByteResponse> {
        if let Some(err) = &self.fail_open {
            return Err(err.clone());
        }
        let first = {
            let mut opened = self.opened.lock();
            opened.push(RangeSpec::from_start(0));
            opened.len() == 1
        };
        let (fail_after, close_after) = if first {
            (self.fail_after_chunks, self.close_after_chunks)
        } else {
            (None, None)
        };
        Ok(self.body(0, self.data.len() as u64, fail_after, close_after))
    }

    async fn get_range(
        &self,
        url: &Url,
        range: RangeSpec,
        _headers: Option<Headers>,
    ) -> NetResult<ByteResponse> {
        self.opened.lock().push(range);
        if !self.ranges {
            return Err(NetError::RangeNotSatisfied {
                status: 200,
                url: url.to_string(),
            });
        }
        let total = self.data.len() as u64;
        if range.start > total {
            return Err(NetError::InvalidRange(range.to_header_value()));
        }
        let end = range.end.map_or(total, |e| (e + 1).min(total));
        Ok(self.body(range.start, end, None, None))
    }
}
