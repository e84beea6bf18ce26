#![forbid(unsafe_code)]

//! Configuration for [`Session`](crate::Session).

use std::path::PathBuf;

use derive_setters::Setters;
use tapedeck_events::EventBus;
use tapedeck_net::NetOptions;
use tapedeck_play::DEFAULT_NOMINAL_BYTE_RATE;
use tapedeck_stream::IngestMode;
use tokio_util::sync::CancellationToken;
use url::Url;

/// How far seeks may move ahead of the write cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SeekPolicy {
    /// Forward seeks are clamped to the write cursor. The temp file is only
    /// ever appended to.
    #[default]
    Conservative,
    /// Experimental. A forward seek past the write cursor restarts ingestion
    /// with a ranged request at the target, leaving a hole behind. The file
    /// is promoted only if every byte eventually arrives; with `fill_gaps`
    /// the holes are fetched after the stream ends.
    Relaxed { fill_gaps: bool },
}

impl SeekPolicy {
    pub fn ingest_mode(self) -> IngestMode {
        match self {
            Self::Conservative => IngestMode::Sequential,
            Self::Relaxed { fill_gaps } => IngestMode::Ranged { fill_gaps },
        }
    }

    pub fn allows_forward_seek(self) -> bool {
        matches!(self, Self::Relaxed { .. })
    }
}

/// Everything needed to open a [`Session`](crate::Session).
///
/// ```ignore
/// let config = SessionConfig::new(url, "/music/track.mp3".into())
///     .with_seek_policy(SeekPolicy::Relaxed { fill_gaps: true })
///     .with_looping(true);
/// ```
#[derive(Clone, Debug, Setters)]
#[setters(prefix = "with_")]
pub struct SessionConfig {
    /// Remote asset.
    #[setters(skip)]
    pub remote: Url,
    /// Final location of the persisted copy. Its parent must exist and be
    /// writable.
    #[setters(skip)]
    pub destination: PathBuf,
    /// Directory for the in-progress temp file.
    #[setters(into)]
    pub temp_dir: PathBuf,
    #[setters(into)]
    pub temp_prefix: String,
    pub seek_policy: SeekPolicy,
    /// HTTP client options (default headers, connection pool).
    pub net: NetOptions,
    /// `fsync` every append before the write cursor moves.
    pub sync_writes: bool,
    /// Bytes per second used for time conversion until the renderer reports
    /// a duration.
    pub nominal_byte_rate: u64,
    /// Broadcast capacity when the session creates its own bus.
    pub event_channel_capacity: usize,
    /// Publish into an existing bus instead of a private one.
    #[setters(strip_option)]
    pub bus: Option<EventBus>,
    /// Parent token; the session derives a child from it.
    #[setters(strip_option)]
    pub cancel: Option<CancellationToken>,
    /// Publish `DownloadProgress` and `PlaybackProgress`.
    pub emit_progress: bool,
    /// Bytes of playback between two `PlaybackProgress` events.
    pub progress_step: u64,
    /// Upper bound of one hole-filling request under the relaxed policy.
    pub gap_request_size: u64,
    /// Container hint for the renderer. Taken from the URL path when unset.
    #[setters(strip_option, into)]
    pub hint: Option<String>,
    pub volume: f32,
    pub looping: bool,
}

impl SessionConfig {
    pub fn new(remote: Url, destination: PathBuf) -> Self {
        Self {
            remote,
            destination,
            temp_dir: std::env::temp_dir(),
            temp_prefix: "tapedeck".to_string(),
            seek_policy: SeekPolicy::Conservative,
            net: NetOptions::default(),
            sync_writes: true,
            nominal_byte_rate: DEFAULT_NOMINAL_BYTE_RATE,
            event_channel_capacity: 64,
            bus: None,
            cancel: None,
            emit_progress: true,
            progress_step: 64 * 1024,
            gap_request_size: 2 * 1024 * 1024,
            hint: None,
            volume: 1.0,
            looping: false,
        }
    }

    /// Explicit hint, else the extension of the remote path.
    pub fn container_hint(&self) -> Option<String> {
        self.hint.clone().or_else(|| {
            std::path::Path::new(self.remote.path())
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase)
        })
    }
}
