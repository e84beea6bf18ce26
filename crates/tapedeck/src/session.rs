#![forbid(unsafe_code)]

//! Public session handle.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tapedeck_events::{
    Dispatcher, EventBus, EventKind, ListenerId, ListenerRegistry, Notification, Notifier,
    SessionId,
};
use tapedeck_net::{HttpClient, Net};
use tapedeck_play::{
    AssetLoadState, AttachOptions, ByteTimeline, PlaybackAdapter, PlaybackState, Renderer,
    signal_channel,
};
use tapedeck_storage::{TempAllocator, TempFile, TempFileOptions};
use tapedeck_stream::{PersistenceConfig, PersistenceState, PersistenceWriter, PipeSource};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    SessionConfig, SessionError, SessionResult,
    coordinator::{Coordinator, CoordinatorParts},
    driver::drive,
};

/// One remote asset being played and persisted.
///
/// Created with [`Session::open`]; torn down by [`destroy`](Self::destroy) or
/// on drop. Must be created inside a tokio runtime.
///
/// Notifications raised while `open` is still running can only be observed
/// through a bus passed in with [`SessionConfig::with_bus`].
pub struct Session {
    id: SessionId,
    coordinator: Arc<Coordinator>,
    registry: ListenerRegistry,
    bus: EventBus,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("load", &self.asset_load_state())
            .field("playback", &self.playback_state())
            .field("persistence", &self.persistence_state())
            .field("write_cursor", &self.write_cursor())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Opens `config.remote` over HTTP and starts playing it through
    /// `renderer` while persisting it to `config.destination`.
    pub async fn open(config: SessionConfig, renderer: impl Renderer) -> SessionResult<Self> {
        let net: Arc<dyn Net> = Arc::new(HttpClient::new(config.net.clone())?);
        Self::with_net(config, net, renderer).await
    }

    /// Like [`open`](Self::open) with a caller-supplied network.
    ///
    /// Only a bad destination or an unusable temp directory is returned as an
    /// error. A failed request yields a session whose asset load state is
    /// `Failed`.
    pub async fn with_net(
        config: SessionConfig,
        net: Arc<dyn Net>,
        renderer: impl Renderer,
    ) -> SessionResult<Self> {
        check_destination(&config.destination)?;

        let cancel = config
            .cancel
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);

        let allocator = TempAllocator::new(&config.temp_dir).with_prefix(&config.temp_prefix);
        let file = TempFile::create(
            &allocator,
            TempFileOptions::new(allocator.allocate_temp_location(), cancel.clone())
                .with_sync_writes(config.sync_writes),
        )?;

        let id = SessionId::next();
        let (notifier, queue) = Notifier::channel(id);
        let registry = ListenerRegistry::new();
        let bus = config
            .bus
            .clone()
            .unwrap_or_else(|| EventBus::new(config.event_channel_capacity));
        Dispatcher::spawn(queue, registry.clone(), bus.clone(), cancel.clone());

        let coordinator = Arc::new(Coordinator::new(CoordinatorParts {
            file: file.clone(),
            destination: config.destination.clone(),
            adapter: PlaybackAdapter::new(renderer),
            notifier,
            policy: config.seek_policy,
            timeline: ByteTimeline::new(config.nominal_byte_rate),
            emit_progress: config.emit_progress,
            volume: config.volume,
            looping: config.looping,
        }));
        info!(
            session = %id,
            remote = %config.remote,
            destination = %config.destination.display(),
            temp = %file.path().display(),
            policy = ?config.seek_policy,
            "session starting"
        );
        coordinator.begin_loading();

        let session = Self {
            id,
            coordinator: Arc::clone(&coordinator),
            registry,
            bus,
            cancel: cancel.clone(),
        };

        let source = PipeSource::new(net, config.remote.clone(), cancel.clone());
        let pipe = match source.open().await {
            Ok(pipe) => pipe,
            Err(e) => {
                coordinator.on_open_failed(&e);
                return Ok(session);
            }
        };

        let (signals_tx, signals_rx) = signal_channel();
        coordinator.attach(
            signals_tx,
            AttachOptions {
                hint: config.container_hint(),
                progress_step: config.emit_progress.then_some(config.progress_step),
            },
        );

        let persistence = PersistenceConfig::new(&config.destination, allocator)
            .with_mode(config.seek_policy.ingest_mode())
            .with_gap_request_size(config.gap_request_size);
        let (writer, handle, writer_events) =
            PersistenceWriter::new(source, file, persistence, cancel.clone());
        coordinator.set_writer(handle);
        writer.start(pipe);

        tokio::spawn(drive(
            coordinator,
            signals_rx.to_async(),
            writer_events,
            cancel,
        ));
        Ok(session)
    }

    pub fn session_id(&self) -> SessionId {
        self.id
    }

    // -- transport --

    /// Starts or resumes playback. Ignored until the asset is loaded.
    pub fn play(&self) {
        self.coordinator.play();
    }

    pub fn pause(&self) {
        self.coordinator.pause();
    }

    /// Tears the session down. Safe to call more than once and from any
    /// thread. No notification is delivered afterwards.
    pub fn destroy(&self) {
        if self.coordinator.destroy() {
            self.cancel.cancel();
            debug!(session = %self.id, "session torn down");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.coordinator.is_destroyed()
    }

    pub fn volume(&self) -> f32 {
        self.coordinator.volume()
    }

    /// Clamped to `0.0..=1.0`.
    pub fn set_volume(&self, volume: f32) {
        self.coordinator.set_volume(volume);
    }

    pub fn looping(&self) -> bool {
        self.coordinator.looping()
    }

    pub fn set_looping(&self, looping: bool) {
        self.coordinator.set_looping(looping);
    }

    // -- seeking --

    /// Moves playback back by `amount`, stopping at the start. Returns the
    /// new position.
    pub fn shift_back(&self, amount: Duration) -> SessionResult<Duration> {
        self.coordinator.shift_back(amount)
    }

    /// Moves playback to `time`.
    ///
    /// Under [`SeekPolicy::Conservative`](crate::SeekPolicy) a target past
    /// the written bytes is clamped to the write cursor and playback stalls
    /// there. Under the relaxed policy ingestion restarts at the target.
    pub fn seek_to(&self, time: Duration) -> SessionResult<Duration> {
        self.coordinator.seek_to(time)
    }

    /// Byte-level variant of [`seek_to`](Self::seek_to).
    pub fn seek_bytes(&self, offset: u64) -> SessionResult<u64> {
        self.coordinator.seek_bytes(offset)
    }

    /// Re-attempts moving the temp file to its destination after a promotion
    /// failure. Returns false when there is nothing to retry.
    pub fn retry_promotion(&self) -> bool {
        self.coordinator.retry_promotion()
    }

    // -- notifications --

    /// Receiver for every notification of this session.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.bus.subscribe()
    }

    /// Registers `listener` for `kinds`. The session only holds a weak
    /// reference; dropping the `Arc` unsubscribes.
    pub fn add_listener<F>(&self, kinds: &[EventKind], listener: &Arc<F>) -> ListenerId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.registry.register(kinds, listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.registry.unregister(id)
    }

    // -- state --

    pub fn is_asset_loaded(&self) -> bool {
        self.asset_load_state() == AssetLoadState::Loaded
    }

    pub fn asset_load_state(&self) -> AssetLoadState {
        self.coordinator.load_state()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.coordinator.playback_state()
    }

    pub fn persistence_state(&self) -> PersistenceState {
        self.coordinator.persistence_state()
    }

    pub fn playing(&self) -> bool {
        self.playback_state() == PlaybackState::Playing
    }

    /// Reported by the renderer, else estimated from the total length.
    pub fn duration(&self) -> Option<Duration> {
        self.coordinator.duration()
    }

    pub fn current_time(&self) -> Duration {
        self.coordinator.current_time()
    }

    /// Playable time ahead of the current position.
    pub fn time_buffered(&self) -> Duration {
        self.coordinator.time_buffered()
    }

    pub fn write_cursor(&self) -> u64 {
        self.coordinator.file().write_cursor()
    }

    pub fn playback_cursor(&self) -> u64 {
        self.coordinator.position()
    }

    pub fn total_length(&self) -> Option<u64> {
        self.coordinator.total_length()
    }

    /// Current location of the backing file; the destination once persisted.
    pub fn temp_path(&self) -> PathBuf {
        self.coordinator.file().path()
    }

    pub fn destination(&self) -> &Path {
        self.coordinator.destination()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn check_destination(destination: &Path) -> SessionResult<()> {
    if destination.file_name().is_none() {
        return Err(SessionError::InvalidDestination(destination.to_path_buf()));
    }
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    NamedTempFile::new_in(parent).map_err(|source| SessionError::DestinationNotWritable {
        path: parent.to_path_buf(),
        source,
    })?;
    Ok(())
}
