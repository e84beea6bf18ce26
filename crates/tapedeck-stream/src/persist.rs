#![forbid(unsafe_code)]

//! Persistence writer.
//!
//! Drives at most one [`IngestionPipe`] at a time into the session temp file
//! and, once every byte is durable, moves the file to its destination. The
//! destination path is only ever written by that move.
//!
//! Sequential mode accepts exactly one full-body pipe. Ranged mode also
//! accepts restart commands (forward seeks past the write front) and can fill
//! the holes those leave behind with bounded range requests.

use std::{path::PathBuf, sync::Arc};

use futures::StreamExt;
use tapedeck_net::{NetError, RangeSpec};
use tapedeck_storage::{TempAllocator, TempFile};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ChunkWriter, IngestionPipe, PersistError, PipeSource, WriterError, WriterItem};

const DEFAULT_GAP_REQUEST_SIZE: u64 = 2 * 1024 * 1024;

/// Lifecycle of the local copy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PersistenceState {
    #[default]
    Downloading,
    Persisted,
    Failed,
}

/// How bytes may arrive in the temp file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IngestMode {
    /// One body from byte 0, strictly appended.
    #[default]
    Sequential,
    /// Restarts at arbitrary offsets are allowed; promotion waits for full coverage.
    Ranged { fill_gaps: bool },
}

#[derive(Clone, Debug)]
pub struct PersistenceConfig {
    pub destination: PathBuf,
    pub allocator: TempAllocator,
    pub mode: IngestMode,
    /// Upper bound for a single hole-filling request.
    pub gap_request_size: u64,
}

impl PersistenceConfig {
    pub fn new(destination: impl Into<PathBuf>, allocator: TempAllocator) -> Self {
        Self {
            destination: destination.into(),
            allocator,
            mode: IngestMode::Sequential,
            gap_request_size: DEFAULT_GAP_REQUEST_SIZE,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: IngestMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_gap_request_size(mut self, size: u64) -> Self {
        self.gap_request_size = size.max(1);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterCommand {
    /// Continue ingestion from the first missing byte at or after the offset.
    RestartAt(u64),
    /// Re-attempt the move after a promotion failure.
    RetryPromotion,
}

/// Progress and outcomes, in the order they happened.
#[derive(Clone, Debug)]
pub enum WriterEvent {
    TotalLength(u64),
    Progress { offset: u64, len: u64, cursor: u64 },
    RangeOpened { start: u64 },
    Persisted { path: PathBuf },
    Failed { error: Arc<PersistError>, promotion: bool },
}

/// Command side of a running writer.
#[derive(Clone, Debug)]
pub struct PersistenceHandle {
    commands: mpsc::UnboundedSender<WriterCommand>,
}

impl PersistenceHandle {
    /// Returns false once the writer has exited.
    pub fn restart_at(&self, offset: u64) -> bool {
        self.commands.send(WriterCommand::RestartAt(offset)).is_ok()
    }

    pub fn retry_promotion(&self) -> bool {
        self.commands.send(WriterCommand::RetryPromotion).is_ok()
    }
}

pub struct PersistenceWriter {
    source: PipeSource,
    file: TempFile,
    config: PersistenceConfig,
    events: mpsc::UnboundedSender<WriterEvent>,
    commands: mpsc::UnboundedReceiver<WriterCommand>,
    cancel: CancellationToken,
    state: PersistenceState,
}

impl PersistenceWriter {
    pub fn new(
        source: PipeSource,
        file: TempFile,
        config: PersistenceConfig,
        cancel: CancellationToken,
    ) -> (Self, PersistenceHandle, mpsc::UnboundedReceiver<WriterEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let writer = Self {
            source,
            file,
            config,
            events: events_tx,
            commands: commands_rx,
            cancel,
            state: PersistenceState::Downloading,
        };
        (
            writer,
            PersistenceHandle {
                commands: commands_tx,
            },
            events_rx,
        )
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn start(self, pipe: IngestionPipe) -> JoinHandle<PersistenceState> {
        tokio::spawn(self.run(pipe))
    }

    /// Consumes `pipe` (and any follow-up pipes) until the file is promoted,
    /// fails, or the session is cancelled. Returns the state reached.
    pub async fn run(mut self, pipe: IngestionPipe) -> PersistenceState {
        match self.ingest(pipe).await {
            Ok(total) => self.promote_with_retry(total).await,
            Err(e) if is_cancelled(&e) => {
                debug!(cursor = self.file.write_cursor(), "persistence stopped");
            }
            Err(e) => self.fail(e, false),
        }
        self.state
    }

    fn emit(&self, event: WriterEvent) {
        let _ = self.events.send(event);
    }

    fn note_total(&self, total: Option<u64>) {
        if let Some(total) = total
            && self.file.total_len().is_none()
        {
            self.file.set_total_len(total);
            self.emit(WriterEvent::TotalLength(total));
        }
    }

    async fn ingest(&mut self, first: IngestionPipe) -> Result<u64, PersistError> {
        let mut pipe = first;

        'pipes: loop {
            self.note_total(pipe.total_length());
            let mut position = pipe.start_offset();
            let mut writer = ChunkWriter::new(pipe, self.file.clone());

            let end = loop {
                tokio::select! {
                    biased;

                    () = self.cancel.cancelled() => {
                        return Err(WriterError::Source(NetError::Cancelled).into());
                    }

                    Some(command) = self.commands.recv() => {
                        let WriterCommand::RestartAt(target) = command else {
                            continue;
                        };
                        let Some(start) = self.restart_offset(target, position) else {
                            continue;
                        };
                        drop(writer);
                        pipe = self.open_range(RangeSpec::from_start(start)).await?;
                        continue 'pipes;
                    }

                    item = writer.next() => match item {
                        Some(Ok(WriterItem::ChunkWritten { offset, len, cursor })) => {
                            position = offset + len as u64;
                            self.emit(WriterEvent::Progress {
                                offset,
                                len: len as u64,
                                cursor,
                            });
                        }
                        Some(Ok(WriterItem::StreamEnded { end })) => break end,
                        Some(Err(e)) => return Err(e.into()),
                        None => break position,
                    },
                }
            };

            let total = if let Some(total) = self.file.total_len() {
                total
            } else {
                self.note_total(Some(end));
                end
            };
            if self.file.is_fully_covered() {
                return Ok(total);
            }

            match self.config.mode {
                IngestMode::Sequential => {
                    return Err(PersistError::Incomplete {
                        cursor: self.file.write_cursor(),
                        total,
                    });
                }
                IngestMode::Ranged { fill_gaps: false } => {
                    return Err(PersistError::Holes(self.file.gaps()));
                }
                IngestMode::Ranged { fill_gaps: true } => {
                    let Some(range) = self
                        .file
                        .next_gap(self.config.gap_request_size)
                        .and_then(RangeSpec::from_half_open)
                    else {
                        return Ok(total);
                    };
                    debug!(start = range.start, end = ?range.end, "filling hole");
                    pipe = self.open_range(range).await?;
                }
            }
        }
    }

    /// Where a restart towards `target` should begin, or `None` when the
    /// current pipe already serves it or nothing is missing there.
    fn restart_offset(&self, target: u64, position: u64) -> Option<u64> {
        if self.config.mode == IngestMode::Sequential {
            warn!(target, "restart ignored in sequential mode");
            return None;
        }
        let start = self.file.readable_end(target);
        let past_end = self.file.total_len().is_some_and(|total| start >= total);
        if start == position || past_end {
            return None;
        }
        Some(start)
    }

    async fn open_range(&self, range: RangeSpec) -> Result<IngestionPipe, PersistError> {
        let pipe = self
            .source
            .open_at(range)
            .await
            .map_err(PersistError::Open)?;
        self.emit(WriterEvent::RangeOpened { start: range.start });
        Ok(pipe)
    }

    async fn promote_with_retry(&mut self, total: u64) {
        if let Err(e) = self.file.complete(total) {
            warn!(error = %e, "complete rejected");
            self.fail(PersistError::Holes(self.file.gaps()), false);
            return;
        }

        loop {
            if self.cancel.is_cancelled() {
                debug!("promotion skipped, session cancelled");
                return;
            }
            let destination = self.config.destination.clone();
            match self
                .config
                .allocator
                .move_file(&self.file.path(), &destination)
            {
                Ok(()) => {
                    self.file.relocate(&destination);
                    self.state = PersistenceState::Persisted;
                    info!(path = %destination.display(), total, "asset persisted");
                    self.emit(WriterEvent::Persisted { path: destination });
                    return;
                }
                Err(e) => self.fail(PersistError::Promote(e), true),
            }

            loop {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return,
                    command = self.commands.recv() => match command {
                        Some(WriterCommand::RetryPromotion) => break,
                        Some(WriterCommand::RestartAt(_)) => {}
                        None => return,
                    },
                }
            }
            debug!("retrying promotion");
        }
    }

    fn fail(&mut self, error: PersistError, promotion: bool) {
        warn!(
            %error,
            promotion,
            cursor = self.file.write_cursor(),
            temp = %self.file.path().display(),
            "persistence failed"
        );
        if !promotion {
            self.file.abandon(error.to_string());
        }
        self.state = PersistenceState::Failed;
        self.emit(WriterEvent::Failed {
            error: Arc::new(error),
            promotion,
        });
    }
}

fn is_cancelled(error: &PersistError) -> bool {
    match error {
        PersistError::Ingestion(e) => e.is_cancelled(),
        PersistError::Open(e) => e.is_cancelled(),
        _ => false,
    }
}
