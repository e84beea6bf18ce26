#![forbid(unsafe_code)]

use std::{
    fmt,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// Process-unique session identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Everything a session reports to its observers.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum SessionEvent {
    /// Asset load state became `Loaded`.
    AssetLoaded { duration: Option<Duration> },
    /// Asset load state became `Failed`.
    AssetFailedToLoad { reason: String },
    /// The complete file now exists at its destination.
    AssetPersisted { path: PathBuf },
    /// Persistence state became `Failed` after the asset had loaded.
    PersistenceFailed { reason: String },
    /// Natural end of media without looping.
    PlaybackFinished,
    /// Playback caught up with the write front.
    StreamingStalled { offset: u64 },
    /// Buffered data is available again after a stall.
    StreamingRecovered { offset: u64 },
    /// End offset of the latest durable chunk.
    DownloadProgress { offset: u64, total: Option<u64> },
    /// Byte position handed to the renderer.
    PlaybackProgress { position: u64, total: Option<u64> },
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::AssetLoaded { .. } => EventKind::AssetLoaded,
            Self::AssetFailedToLoad { .. } => EventKind::AssetFailedToLoad,
            Self::AssetPersisted { .. } => EventKind::AssetPersisted,
            Self::PersistenceFailed { .. } => EventKind::PersistenceFailed,
            Self::PlaybackFinished => EventKind::PlaybackFinished,
            Self::StreamingStalled { .. } => EventKind::StreamingStalled,
            Self::StreamingRecovered { .. } => EventKind::StreamingRecovered,
            Self::DownloadProgress { .. } => EventKind::DownloadProgress,
            Self::PlaybackProgress { .. } => EventKind::PlaybackProgress,
        }
    }
}

/// Payload-free tag of a [`SessionEvent`], used for listener filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    AssetLoaded,
    AssetFailedToLoad,
    AssetPersisted,
    PersistenceFailed,
    PlaybackFinished,
    StreamingStalled,
    StreamingRecovered,
    DownloadProgress,
    PlaybackProgress,
}

impl EventKind {
    /// Outcome notifications, without the progress stream.
    pub const OUTCOMES: &'static [Self] = &[
        Self::AssetLoaded,
        Self::AssetFailedToLoad,
        Self::AssetPersisted,
        Self::PersistenceFailed,
        Self::PlaybackFinished,
        Self::StreamingStalled,
        Self::StreamingRecovered,
    ];

    pub const ALL: &'static [Self] = &[
        Self::AssetLoaded,
        Self::AssetFailedToLoad,
        Self::AssetPersisted,
        Self::PersistenceFailed,
        Self::PlaybackFinished,
        Self::StreamingStalled,
        Self::StreamingRecovered,
        Self::DownloadProgress,
        Self::PlaybackProgress,
    ];

    fn bit(self) -> u16 {
        1 << self as u16
    }

    pub(crate) fn mask(kinds: &[Self]) -> u16 {
        kinds.iter().fold(0, |acc, kind| acc | kind.bit())
    }

    pub(crate) fn in_mask(self, mask: u16) -> bool {
        mask & self.bit() != 0
    }
}

/// A [`SessionEvent`] tagged with the session that raised it.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub session: SessionId,
    pub event: SessionEvent,
}
