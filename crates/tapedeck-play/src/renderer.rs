#![forbid(unsafe_code)]

use std::io::{self, Read, Seek, SeekFrom};

use crate::{AssetError, RendererEvents, TrailingReader};

/// Byte input handed to a [`Renderer`].
#[derive(Debug)]
pub struct MediaInput {
    reader: TrailingReader,
    hint: Option<String>,
}

impl MediaInput {
    pub fn new(reader: TrailingReader, hint: Option<String>) -> Self {
        Self { reader, hint }
    }

    /// Container hint taken from the remote path, e.g. `"mp3"`.
    pub fn extension_hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn total_len(&self) -> Option<u64> {
        self.reader.len()
    }

    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    pub fn into_reader(self) -> TrailingReader {
        self.reader
    }
}

impl Read for MediaInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for MediaInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.reader.seek(pos)
    }
}

/// External decode/render pipeline.
///
/// Implementations own their threads. Transport calls must not block: they
/// are made while the session state is locked. Reads from the
/// [`MediaInput`] may block, and fail with [`io::ErrorKind::Interrupted`]
/// when a seek is pending; the renderer is expected to apply the pending
/// seek and carry on.
#[cfg_attr(
    any(test, feature = "test-utils"),
    unimock::unimock(api = RendererMock)
)]
pub trait Renderer: Send + Sync + 'static {
    /// Takes the input and starts preparing it. Readiness and failures are
    /// reported through `events`.
    fn attach(&self, input: MediaInput, events: RendererEvents) -> Result<(), AssetError>;

    fn play(&self);

    fn pause(&self);

    /// Continue reading at byte `offset`.
    fn seek(&self, offset: u64);

    fn set_volume(&self, volume: f32);

    /// Drops the input and stops all activity. Idempotent.
    fn release(&self);
}
