//! axum router serving one asset with chunked pacing, ranges and fault injection.

use std::{io, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use parking_lot::Mutex;

pub const ASSET_PATH: &str = "/asset.mp3";

/// Requests seen by an [`AssetServer`], as their `Range` header values.
#[derive(Clone, Default)]
pub struct AssetServerLog {
    requests: Arc<Mutex<Vec<Option<String>>>>,
}

impl AssetServerLog {
    #[must_use]
    pub fn range_headers(&self) -> Vec<Option<String>> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[derive(Clone)]
pub struct AssetServer {
    data: Arc<Vec<u8>>,
    chunk_size: usize,
    chunk_delay: Duration,
    fail_after_chunks: Option<usize>,
    ranges: bool,
    log: AssetServerLog,
}

impl AssetServer {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            chunk_size: 64 * 1024,
            chunk_delay: Duration::ZERO,
            fail_after_chunks: None,
            ranges: true,
            log: AssetServerLog::default(),
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Abort the body after `chunks` chunks of the first (non-range) response.
    #[must_use]
    pub fn with_fail_after_chunks(mut self, chunks: usize) -> Self {
        self.fail_after_chunks = Some(chunks);
        self
    }

    /// Ignore `Range` headers and always answer 200 with the whole body.
    #[must_use]
    pub fn without_ranges(mut self) -> Self {
        self.ranges = false;
        self
    }

    #[must_use]
    pub fn log(&self) -> AssetServerLog {
        self.log.clone()
    }

    pub fn router(self) -> Router {
        Router::new()
            .route(ASSET_PATH, get(serve_asset))
            .with_state(self)
    }
}

fn parse_range(value: &str, total: u64) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = if end.is_empty() {
        total.checked_sub(1)?
    } else {
        end.parse::<u64>().ok()?.min(total.checked_sub(1)?)
    };
    (start <= end).then_some((start, end))
}

async fn serve_asset(State(server): State<AssetServer>, headers: HeaderMap) -> Response {
    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    server.log.requests.lock().push(range_header.clone());

    let total = server.data.len() as u64;
    let requested = range_header
        .as_deref()
        .filter(|_| server.ranges)
        .map(|v| parse_range(v, total));

    let (start, end, status) = match requested {
        Some(Some((start, end))) => (start, end + 1, StatusCode::PARTIAL_CONTENT),
        Some(None) => {
            return (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{total}"))],
            )
                .into_response();
        }
        None => (0, total, StatusCode::OK),
    };
    let fail_after = if status == StatusCode::OK {
        server.fail_after_chunks
    } else {
        None
    };

    let data = Arc::clone(&server.data);
    let chunk_size = server.chunk_size;
    let delay = server.chunk_delay;
    let body = async_stream::stream! {
        let mut offset = start as usize;
        let mut sent = 0usize;
        while offset < end as usize {
            if fail_after.is_some_and(|limit| sent >= limit) {
                yield Err(io::Error::new(io::ErrorKind::ConnectionReset, "injected failure"));
                return;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let next = (offset + chunk_size).min(end as usize);
            yield Ok::<_, io::Error>(Bytes::copy_from_slice(&data[offset..next]));
            offset = next;
            sent += 1;
        }
    };

    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header(header::CONTENT_LENGTH, (end - start).to_string())
        .header(header::ACCEPT_RANGES, if server.ranges { "bytes" } else { "none" });
    if status == StatusCode::PARTIAL_CONTENT {
        response = response.header(
            header::CONTENT_RANGE,
            format!("bytes {start}-{}/{total}", end - 1),
        );
    }
    response
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
