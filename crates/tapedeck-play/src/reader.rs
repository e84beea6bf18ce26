#![forbid(unsafe_code)]

//! Gated `Read + Seek` over the growing temp file.
//!
//! The renderer pulls bytes through [`TrailingReader`]. A read never returns
//! bytes that are not durable yet: at an uncovered offset it reports
//! `Starved`, blocks on [`TempFile::wait_range`] and reports `Refilled` once
//! it can continue. The blocking read returns early with
//! [`io::ErrorKind::Interrupted`] when a seek is requested from outside, so
//! the renderer can pick up the new position.

use std::{
    fmt,
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tapedeck_storage::{FileStatus, StorageError, TempFile, WaitOutcome};
use tracing::trace;

use crate::{AdapterSignal, SignalSender};

/// Shared read position of the renderer (the PlaybackCursor).
#[derive(Clone, Debug, Default)]
pub struct PlaybackCursor(Arc<AtomicU64>);

impl PlaybackCursor {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, offset: u64) {
        self.0.store(offset, Ordering::Release);
    }
}

/// Incremented by every external seek; a blocked read whose epoch is stale
/// gives up.
#[derive(Clone, Debug, Default)]
pub struct SeekEpoch(Arc<AtomicU64>);

impl SeekEpoch {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

pub struct TrailingReader {
    file: TempFile,
    handle: File,
    pos: u64,
    cursor: PlaybackCursor,
    epoch: SeekEpoch,
    signals: SignalSender,
    progress_step: Option<u64>,
    last_progress: u64,
}

impl fmt::Debug for TrailingReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrailingReader")
            .field("pos", &self.pos)
            .field("epoch", &self.epoch.current())
            .finish_non_exhaustive()
    }
}

impl TrailingReader {
    /// Opens an independent handle on `file`. The handle stays valid after
    /// the file is promoted to its destination.
    pub fn open(
        file: &TempFile,
        cursor: PlaybackCursor,
        epoch: SeekEpoch,
        signals: SignalSender,
    ) -> Result<Self, StorageError> {
        let handle = file.open_reader()?;
        Ok(Self {
            file: file.clone(),
            handle,
            pos: cursor.get(),
            cursor,
            epoch,
            signals,
            progress_step: None,
            last_progress: 0,
        })
    }

    /// Report `Advanced` every `step` bytes of read progress.
    #[must_use]
    pub fn with_progress_step(mut self, step: Option<u64>) -> Self {
        self.progress_step = step.filter(|s| *s > 0);
        self
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Total length once known.
    pub fn len(&self) -> Option<u64> {
        self.file.total_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    fn signal(&self, signal: AdapterSignal) {
        if self.signals.send(signal).is_err() {
            trace!("reader signal dropped, coordinator gone");
        }
    }

    /// Blocks until bytes at `pos` are durable. `Ok(false)` means end of file.
    fn wait_readable(&self, pos: u64, len: usize, epoch: u64) -> io::Result<bool> {
        if self.file.readable_end(pos) > pos {
            return Ok(true);
        }
        if self.file.total_len().is_some_and(|total| pos >= total)
            || matches!(self.file.status(), FileStatus::Abandoned { .. })
        {
            return Ok(false);
        }

        self.signal(AdapterSignal::Starved { offset: pos });
        let stale = || self.epoch.current() != epoch;
        let outcome = self
            .file
            .wait_range(pos..pos.saturating_add(len as u64), &stale)
            .map_err(storage_to_io)?;

        match outcome {
            WaitOutcome::Ready => {
                self.signal(AdapterSignal::Refilled { offset: pos });
                Ok(true)
            }
            WaitOutcome::Eof => Ok(false),
            WaitOutcome::Interrupted => Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "read interrupted by seek",
            )),
        }
    }

    fn publish(&mut self, epoch: u64) {
        if self.epoch.current() != epoch {
            return;
        }
        self.cursor.set(self.pos);

        if let Some(step) = self.progress_step
            && self.pos >= self.last_progress.saturating_add(step)
        {
            self.last_progress = self.pos - self.pos % step;
            self.signal(AdapterSignal::Advanced { position: self.pos });
        }
    }
}

impl Read for TrailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let epoch = self.epoch.current();
        let pos = self.pos;
        if !self.wait_readable(pos, buf.len(), epoch)? {
            return Ok(0);
        }

        let available = self.file.readable_end(pos).saturating_sub(pos);
        let len = usize::try_from(available).map_or(buf.len(), |a| a.min(buf.len()));
        if len == 0 {
            return Ok(0);
        }

        self.handle.seek(SeekFrom::Start(pos))?;
        let n = self.handle.read(&mut buf[..len])?;
        self.pos = pos.saturating_add(n as u64);
        self.publish(epoch);
        Ok(n)
    }
}

impl Seek for TrailingReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let current = self.pos;
        let new_pos: i128 = match pos {
            SeekFrom::Start(p) => i128::from(p),
            SeekFrom::Current(delta) => i128::from(current).saturating_add(i128::from(delta)),
            SeekFrom::End(delta) => {
                let Some(len) = self.len() else {
                    return Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "seek from end requires known length",
                    ));
                };
                i128::from(len).saturating_add(i128::from(delta))
            }
        };

        let new_pos = u64::try_from(new_pos).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "negative seek position")
        })?;

        if let Some(len) = self.len()
            && new_pos > len
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek past end: new_pos={new_pos} len={len} current_pos={current}"),
            ));
        }

        self.pos = new_pos;
        self.last_progress = new_pos;
        self.cursor.set(new_pos);
        Ok(new_pos)
    }
}

fn storage_to_io(e: StorageError) -> io::Error {
    match e {
        StorageError::Io(e) => e,
        StorageError::Cancelled => io::Error::other("session cancelled"),
        other => io::Error::other(other.to_string()),
    }
}
