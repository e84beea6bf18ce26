#![forbid(unsafe_code)]

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tapedeck_storage::TempFile;
use tracing::debug;

use crate::{IngestionPipe, WriterError};

/// Item yielded by [`ChunkWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterItem {
    /// A chunk is durable at `offset`. `cursor` is the write cursor after it.
    ChunkWritten { offset: u64, len: usize, cursor: u64 },
    /// The pipe ended cleanly; `end` is the asset offset after its last byte.
    ///
    /// The file is not completed here. The caller decides, by comparing with
    /// the expected length and coverage.
    StreamEnded { end: u64 },
}

/// Pipe -> temp file loop as a `Stream`, one item per chunk.
///
/// Each chunk is written at the pipe's own offset, so a ranged pipe lands in
/// the right place. Any error ends the stream after being yielded once.
/// Cancellation surfaces as `WriterError::Source(NetError::Cancelled)`.
pub struct ChunkWriter {
    inner: Pin<Box<dyn Stream<Item = Result<WriterItem, WriterError>> + Send>>,
}

fn create_writer_stream(
    mut pipe: IngestionPipe,
    file: TempFile,
) -> impl Stream<Item = Result<WriterItem, WriterError>> {
    async_stream::stream! {
        let mut offset = pipe.start_offset();
        let mut first_chunk = true;

        loop {
            let bytes = match pipe.next_chunk().await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    debug!(offset, "writer stream ended");
                    yield Ok(WriterItem::StreamEnded { end: offset });
                    return;
                }
                Err(e) => {
                    yield Err(WriterError::Source(e));
                    return;
                }
            };

            if let Err(e) = file.write_at(offset, &bytes) {
                yield Err(WriterError::Sink(e));
                return;
            }

            let start = offset;
            let Some(next) = offset.checked_add(bytes.len() as u64) else {
                yield Err(WriterError::OffsetOverflow);
                return;
            };
            offset = next;

            if first_chunk {
                debug!(offset = start, "writer first chunk durable");
                first_chunk = false;
            }

            yield Ok(WriterItem::ChunkWritten {
                offset: start,
                len: bytes.len(),
                cursor: file.write_cursor(),
            });
        }
    }
}

impl ChunkWriter {
    pub fn new(pipe: IngestionPipe, file: TempFile) -> Self {
        Self {
            inner: Box::pin(create_writer_stream(pipe, file)),
        }
    }
}

impl Stream for ChunkWriter {
    type Item = Result<WriterItem, WriterError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
