#![forbid(unsafe_code)]

//! Growing temp file with a durable write cursor.
//!
//! Bytes become visible to readers only after they are on disk: `write_at`
//! writes, optionally `fsync`s, and only then marks coverage, publishes the
//! new cursor (Release) and wakes waiters. The cursor is the end of the
//! covered prefix starting at offset 0 and never decreases.

use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    ops::Range,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    Coverage, MemCoverage, StorageError, StorageResult, TempAllocator, coverage::first_hole,
};

const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Options for [`TempFile::create`].
#[derive(Debug, Clone)]
pub struct TempFileOptions {
    pub path: PathBuf,
    /// `fsync` after every write before the cursor advances.
    pub sync_writes: bool,
    pub cancel: CancellationToken,
}

impl TempFileOptions {
    pub fn new(path: impl Into<PathBuf>, cancel: CancellationToken) -> Self {
        Self {
            path: path.into(),
            sync_writes: true,
            cancel,
        }
    }

    #[must_use]
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }
}

/// Lifecycle of the temp file contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Still receiving bytes.
    Active,
    /// Every byte of `0..len` is durable.
    Complete { len: u64 },
    /// No more bytes will arrive. Readers see end-of-file at the first hole.
    Abandoned { reason: String },
}

/// Result of [`TempFile::wait_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Bytes at the start of the range are readable.
    Ready,
    /// The range starts past the last byte that will ever exist.
    Eof,
    /// The caller's interrupt predicate fired.
    Interrupted,
}

struct State {
    coverage: MemCoverage,
    status: FileStatus,
    path: PathBuf,
}

struct Inner {
    file: Mutex<File>,
    state: Mutex<State>,
    condvar: Condvar,
    cursor: AtomicU64,
    sync_writes: bool,
    cancel: CancellationToken,
}

/// Shared handle to the session temp file. Cloning is cheap.
#[derive(Clone)]
pub struct TempFile {
    inner: Arc<Inner>,
}

impl fmt::Debug for TempFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TempFile")
            .field("path", &state.path)
            .field("status", &state.status)
            .field("cursor", &self.write_cursor())
            .finish()
    }
}

impl TempFile {
    /// Creates an empty file at `opts.path` and opens it for writing.
    pub fn create(allocator: &TempAllocator, opts: TempFileOptions) -> StorageResult<Self> {
        allocator.save_bytes(&[], &opts.path)?;
        let file = OpenOptions::new().read(true).write(true).open(&opts.path)?;
        debug!(path = %opts.path.display(), "temp file created");

        Ok(Self {
            inner: Arc::new(Inner {
                file: Mutex::new(file),
                state: Mutex::new(State {
                    coverage: MemCoverage::new(),
                    status: FileStatus::Active,
                    path: opts.path,
                }),
                condvar: Condvar::new(),
                cursor: AtomicU64::new(0),
                sync_writes: opts.sync_writes,
                cancel: opts.cancel,
            }),
        })
    }

    /// Current location on disk. Changes once after promotion.
    pub fn path(&self) -> PathBuf {
        self.inner.state.lock().path.clone()
    }

    /// Record the new location after the file has been moved.
    pub fn relocate(&self, path: impl Into<PathBuf>) {
        self.inner.state.lock().path = path.into();
    }

    /// Number of durable bytes in the prefix starting at 0.
    pub fn write_cursor(&self) -> u64 {
        self.inner.cursor.load(Ordering::Acquire)
    }

    pub fn total_len(&self) -> Option<u64> {
        self.inner.state.lock().coverage.total_size()
    }

    pub fn set_total_len(&self, len: u64) {
        self.inner.state.lock().coverage.set_total_size(len);
    }

    pub fn status(&self) -> FileStatus {
        self.inner.state.lock().status.clone()
    }

    /// Opens an independent read handle on the current path.
    ///
    /// The handle keeps pointing at the same file after promotion.
    pub fn open_reader(&self) -> StorageResult<File> {
        let path = self.path();
        Ok(File::open(path)?)
    }

    /// Appends `data` at the write cursor and returns the new cursor.
    pub fn append(&self, data: &[u8]) -> StorageResult<u64> {
        self.write_at(self.write_cursor(), data)?;
        Ok(self.write_cursor())
    }

    /// Writes `data` at `offset`. Coverage and cursor move only after the
    /// bytes are durable.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.check_writable()?;

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(StorageError::InvalidRange {
                start: offset,
                end: u64::MAX,
            })?;

        {
            let mut file = self.inner.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(data)?;
            if self.inner.sync_writes {
                file.sync_data()?;
            } else {
                file.flush()?;
            }
        }

        let cursor = {
            let mut state = self.inner.state.lock();
            state.coverage.mark(offset..end);
            let prefix_end = state.coverage.contiguous_end(0);
            self.inner.cursor.fetch_max(prefix_end, Ordering::Release);
            prefix_end
        };
        self.inner.condvar.notify_all();

        trace!(offset, len = data.len(), cursor, "temp write durable");
        Ok(())
    }

    /// Reads durable bytes at `offset` through the writer's handle.
    ///
    /// Returns 0 when `offset` is not covered.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        let available = self.readable_end(offset).saturating_sub(offset);
        let len = usize::try_from(available).map_or(buf.len(), |a| a.min(buf.len()));
        if len == 0 {
            return Ok(0);
        }
        let mut file = self.inner.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf[..len])?;
        Ok(len)
    }

    /// End of the durable run that contains `from`.
    pub fn readable_end(&self, from: u64) -> u64 {
        let state = self.inner.state.lock();
        match state.status {
            FileStatus::Complete { len } => len,
            _ => state.coverage.contiguous_end(from),
        }
    }

    pub fn covers(&self, range: Range<u64>) -> bool {
        self.inner.state.lock().coverage.covers(range)
    }

    /// Whether every byte of the known total is durable.
    pub fn is_fully_covered(&self) -> bool {
        self.inner.state.lock().coverage.is_complete()
    }

    pub fn next_gap(&self, max_size: u64) -> Option<Range<u64>> {
        self.inner.state.lock().coverage.next_gap(max_size)
    }

    pub fn gaps(&self) -> Vec<Range<u64>> {
        self.inner.state.lock().coverage.gaps()
    }

    /// Marks the file complete. Requires full coverage of `0..len`.
    pub fn complete(&self, len: u64) -> StorageResult<()> {
        {
            let mut state = self.inner.state.lock();
            if let Some(hole) = first_hole(&mut state.coverage, len) {
                return Err(StorageError::InvalidRange {
                    start: hole.start,
                    end: hole.end,
                });
            }
            state.status = FileStatus::Complete { len };
        }
        self.inner.condvar.notify_all();
        debug!(len, "temp file complete");
        Ok(())
    }

    /// Seals the file: no more bytes will arrive. Durable bytes stay readable.
    pub fn abandon(&self, reason: impl Into<String>) {
        {
            let mut state = self.inner.state.lock();
            if matches!(state.status, FileStatus::Complete { .. }) {
                return;
            }
            state.status = FileStatus::Abandoned {
                reason: reason.into(),
            };
        }
        self.inner.condvar.notify_all();
    }

    /// Blocks until the first byte of `range` is readable.
    ///
    /// Returns early on cancellation, on end-of-file (file complete or
    /// abandoned and the byte will never arrive) or when `interrupt` returns
    /// true. `interrupt` is polled at least every 50ms.
    pub fn wait_range(
        &self,
        range: Range<u64>,
        interrupt: &dyn Fn() -> bool,
    ) -> StorageResult<WaitOutcome> {
        if range.start > range.end {
            return Err(StorageError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
        let first = range.start..range.start.saturating_add(1);

        loop {
            let mut state = self.inner.state.lock();

            if self.inner.cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            if interrupt() {
                return Ok(WaitOutcome::Interrupted);
            }

            match state.status {
                FileStatus::Complete { len } => {
                    return Ok(if range.start >= len {
                        WaitOutcome::Eof
                    } else {
                        WaitOutcome::Ready
                    });
                }
                _ if state.coverage.covers(first.clone()) => return Ok(WaitOutcome::Ready),
                FileStatus::Abandoned { .. } => return Ok(WaitOutcome::Eof),
                FileStatus::Active => {}
            }

            self.inner.condvar.wait_for(&mut state, WAIT_SLICE);
        }
    }

    /// Wakes every waiter so interrupt predicates are re-evaluated.
    pub fn wake_waiters(&self) {
        self.inner.condvar.notify_all();
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        match &self.inner.state.lock().status {
            FileStatus::Active => Ok(()),
            FileStatus::Complete { .. } => Err(StorageError::AlreadyComplete),
            FileStatus::Abandoned { reason } => Err(StorageError::Abandoned(reason.clone())),
        }
    }
}
