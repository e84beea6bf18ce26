#![forbid(unsafe_code)]

//! Session state machine.
//!
//! Owns the three states (asset load, playback, persistence), the playback
//! adapter and the writer handle behind one mutex, so no two transitions of
//! a session ever interleave. Every handler runs under that lock and
//! enqueues at most one outcome notification per transition.
//!
//! The seek rule: the renderer is never pointed past the write cursor unless
//! the relaxed policy is on and ingestion is restarted at the target.

use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use parking_lot::{Mutex, MutexGuard};
use portable_atomic::AtomicF32;
use tapedeck_events::{Notifier, SessionEvent};
use tapedeck_net::NetError;
use tapedeck_play::{
    AdapterSignal, AssetError, AssetLoadState, AttachOptions, ByteTimeline, PlaybackAdapter,
    PlaybackState, SignalSender,
};
use tapedeck_storage::TempFile;
use tapedeck_stream::{PersistenceHandle, PersistenceState, WriterEvent};
use tracing::{debug, info, trace, warn};

use crate::{SeekPolicy, SessionError, SessionResult};

pub(crate) struct CoordinatorParts {
    pub file: TempFile,
    pub destination: PathBuf,
    pub adapter: PlaybackAdapter,
    pub notifier: Notifier,
    pub policy: SeekPolicy,
    pub timeline: ByteTimeline,
    pub emit_progress: bool,
    pub volume: f32,
    pub looping: bool,
}

struct State {
    load: AssetLoadState,
    playback: PlaybackState,
    persistence: PersistenceState,
    /// Caller intent, kept across stalls.
    wants_playing: bool,
    stalled_at: Option<u64>,
    promotion_pending: bool,
    timeline: ByteTimeline,
    adapter: PlaybackAdapter,
    writer: Option<PersistenceHandle>,
    destroyed: bool,
}

pub(crate) struct Coordinator {
    state: Mutex<State>,
    file: TempFile,
    destination: PathBuf,
    notifier: Notifier,
    policy: SeekPolicy,
    emit_progress: bool,
    volume: AtomicF32,
    looping: AtomicBool,
}

impl Coordinator {
    pub(crate) fn new(parts: CoordinatorParts) -> Self {
        Self {
            state: Mutex::new(State {
                load: AssetLoadState::Unloaded,
                playback: PlaybackState::Stopped,
                persistence: PersistenceState::Downloading,
                wants_playing: false,
                stalled_at: None,
                promotion_pending: false,
                timeline: parts.timeline,
                adapter: parts.adapter,
                writer: None,
                destroyed: false,
            }),
            file: parts.file,
            destination: parts.destination,
            notifier: parts.notifier,
            policy: parts.policy,
            emit_progress: parts.emit_progress,
            volume: AtomicF32::new(parts.volume.clamp(0.0, 1.0)),
            looping: AtomicBool::new(parts.looping),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }

    fn notify(&self, event: SessionEvent) {
        self.notifier.notify(event);
    }

    // -- setup --

    pub(crate) fn begin_loading(&self) {
        let mut st = self.lock();
        if st.load == AssetLoadState::Unloaded {
            st.load = AssetLoadState::Loading;
            debug!(session = %self.notifier.session(), "asset loading");
        }
    }

    /// Hands the temp file to the renderer. A rejection fails the load but
    /// leaves persistence running.
    pub(crate) fn attach(&self, signals: SignalSender, options: AttachOptions) {
        let mut st = self.lock();
        let volume = self.volume();
        match st.adapter.attach(&self.file, signals, options) {
            Ok(()) => st.adapter.set_volume(volume),
            Err(e) => self.asset_failed(&mut st, &e),
        }
    }

    pub(crate) fn set_writer(&self, handle: PersistenceHandle) {
        self.lock().writer = Some(handle);
    }

    /// The first request for the asset failed; nothing was ingested.
    pub(crate) fn on_open_failed(&self, error: &NetError) {
        let mut st = self.lock();
        warn!(%error, "asset request failed");
        self.file.abandon(error.to_string());
        st.persistence = PersistenceState::Failed;
        if st.load != AssetLoadState::Failed {
            st.load = AssetLoadState::Failed;
            self.notify(SessionEvent::AssetFailedToLoad {
                reason: error.to_string(),
            });
        }
    }

    fn asset_failed(&self, st: &mut State, error: &AssetError) {
        warn!(%error, "renderer rejected asset");
        st.load = AssetLoadState::Failed;
        st.playback = PlaybackState::Stopped;
        self.notify(SessionEvent::AssetFailedToLoad {
            reason: error.to_string(),
        });
    }

    // -- playback side --

    pub(crate) fn on_adapter_signal(&self, signal: AdapterSignal) {
        let mut st = self.lock();
        if st.destroyed {
            return;
        }
        trace!(?signal, load = ?st.load, playback = ?st.playback, "adapter signal");

        match signal {
            AdapterSignal::Ready { duration } => self.loaded(&mut st, duration),
            AdapterSignal::Failed { reason } => self.renderer_failed(&mut st, reason),
            AdapterSignal::Finished => self.finished(&mut st),
            AdapterSignal::Starved { offset } => {
                if st.load == AssetLoadState::Loaded
                    && st.playback == PlaybackState::Playing
                    && !self.is_readable(offset)
                {
                    if Self::ingestion_ended(&st) {
                        self.exhausted(&mut st, offset);
                    } else {
                        self.enter_stall(&mut st, offset);
                    }
                }
            }
            AdapterSignal::Refilled { .. } => {
                if st.playback == PlaybackState::Stalled {
                    self.recover(&mut st);
                }
            }
            AdapterSignal::Advanced { position } => {
                if self.emit_progress && st.load == AssetLoadState::Loaded {
                    self.notify(SessionEvent::PlaybackProgress {
                        position,
                        total: st.timeline.total(),
                    });
                }
            }
        }
    }

    fn loaded(&self, st: &mut State, duration: Option<Duration>) {
        if st.load != AssetLoadState::Loading {
            trace!(load = ?st.load, "late ready ignored");
            return;
        }
        st.load = AssetLoadState::Loaded;
        st.timeline.set_duration(duration);
        info!(?duration, "asset loaded");
        self.notify(SessionEvent::AssetLoaded { duration });
    }

    fn renderer_failed(&self, st: &mut State, reason: String) {
        match st.load {
            AssetLoadState::Loading => {
                warn!(%reason, "renderer failed while loading");
                st.load = AssetLoadState::Failed;
                st.playback = PlaybackState::Stopped;
                self.notify(SessionEvent::AssetFailedToLoad { reason });
            }
            AssetLoadState::Loaded if st.playback.is_active() => {
                warn!(%reason, "renderer failed during playback");
                self.stop_finished(st);
            }
            _ => trace!(%reason, "renderer failure ignored"),
        }
    }

    fn finished(&self, st: &mut State) {
        if st.load != AssetLoadState::Loaded || !st.playback.is_active() {
            return;
        }
        if self.looping() {
            debug!("end of media, looping");
            st.stalled_at = None;
            st.wants_playing = true;
            st.adapter.seek(0);
            st.adapter.play();
            st.playback = PlaybackState::Playing;
            return;
        }
        let position = st.adapter.position();
        if Self::ingestion_ended(st) && st.timeline.total().is_none_or(|total| position < total) {
            self.exhausted(st, position);
            return;
        }
        self.stop_finished(st);
    }

    /// Buffered bytes ran out and ingestion will not resume.
    fn exhausted(&self, st: &mut State, offset: u64) {
        if st.playback != PlaybackState::Stalled {
            st.playback = PlaybackState::Stalled;
            debug!(offset, "buffer exhausted after ingestion failure");
            self.notify(SessionEvent::StreamingStalled { offset });
        }
        self.stop_finished(st);
    }

    fn stop_finished(&self, st: &mut State) {
        st.playback = PlaybackState::Stopped;
        st.wants_playing = false;
        st.stalled_at = None;
        debug!(position = st.adapter.position(), "playback finished");
        self.notify(SessionEvent::PlaybackFinished);
    }

    fn enter_stall(&self, st: &mut State, offset: u64) {
        if st.playback == PlaybackState::Stalled {
            st.stalled_at = Some(offset);
            return;
        }
        st.playback = PlaybackState::Stalled;
        st.stalled_at = Some(offset);
        st.adapter.pause();
        debug!(offset, cursor = self.file.write_cursor(), "playback stalled");
        self.notify(SessionEvent::StreamingStalled { offset });
    }

    fn recover(&self, st: &mut State) {
        let offset = st.stalled_at.take().unwrap_or_else(|| st.adapter.position());
        st.playback = if st.wants_playing {
            st.adapter.play();
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        };
        debug!(offset, playback = ?st.playback, "playback recovered");
        self.notify(SessionEvent::StreamingRecovered { offset });
    }

    // -- persistence side --

    pub(crate) fn on_writer_event(&self, event: WriterEvent) {
        let mut st = self.lock();
        if st.destroyed {
            return;
        }

        match event {
            WriterEvent::TotalLength(total) => {
                debug!(total, "total length known");
                st.timeline.set_total(total);
            }
            WriterEvent::Progress { offset, len, .. } => {
                if self.emit_progress {
                    self.notify(SessionEvent::DownloadProgress {
                        offset: offset + len,
                        total: st.timeline.total(),
                    });
                }
                if st.playback == PlaybackState::Stalled
                    && st.stalled_at.is_some_and(|at| self.is_readable(at))
                {
                    self.recover(&mut st);
                }
            }
            WriterEvent::RangeOpened { start } => debug!(start, "ingestion restarted"),
            WriterEvent::Persisted { path } => {
                st.persistence = PersistenceState::Persisted;
                st.promotion_pending = false;
                self.notify(SessionEvent::AssetPersisted { path });
            }
            WriterEvent::Failed { error, promotion } => {
                self.persistence_failed(&mut st, &error.to_string(), promotion);
            }
        }
    }

    fn persistence_failed(&self, st: &mut State, reason: &str, promotion: bool) {
        st.persistence = PersistenceState::Failed;
        st.promotion_pending = promotion;

        if !promotion && st.load == AssetLoadState::Loading {
            st.load = AssetLoadState::Failed;
            st.playback = PlaybackState::Stopped;
            self.notify(SessionEvent::AssetFailedToLoad {
                reason: reason.to_string(),
            });
            return;
        }

        self.notify(SessionEvent::PersistenceFailed {
            reason: reason.to_string(),
        });
        if !promotion && st.playback == PlaybackState::Stalled {
            self.stop_finished(st);
        }
    }

    /// Re-attempts the move after a promotion failure.
    pub(crate) fn retry_promotion(&self) -> bool {
        let st = self.lock();
        if st.destroyed || !st.promotion_pending {
            return false;
        }
        st.writer
            .as_ref()
            .is_some_and(PersistenceHandle::retry_promotion)
    }

    // -- transport --

    pub(crate) fn play(&self) {
        let mut st = self.lock();
        if st.destroyed || st.load != AssetLoadState::Loaded {
            debug!(load = ?st.load, "play ignored");
            return;
        }
        st.wants_playing = true;
        match st.playback {
            PlaybackState::Playing | PlaybackState::Stalled => {}
            _ => {
                st.adapter.play();
                st.playback = PlaybackState::Playing;
            }
        }
    }

    pub(crate) fn pause(&self) {
        let mut st = self.lock();
        if st.destroyed || st.load != AssetLoadState::Loaded {
            return;
        }
        st.wants_playing = false;
        if st.playback == PlaybackState::Playing {
            st.adapter.pause();
            st.playback = PlaybackState::Paused;
        }
    }

    pub(crate) fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.volume.store(volume, Ordering::Relaxed);
        let st = self.lock();
        st.adapter.set_volume(volume);
    }

    pub(crate) fn volume(&self) -> f32 {
        self.volume.load(Ordering::Relaxed)
    }

    pub(crate) fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    pub(crate) fn looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    // -- seeking --

    /// Moves the playback cursor to `target` and returns the offset actually
    /// used.
    pub(crate) fn seek_bytes(&self, target: u64) -> SessionResult<u64> {
        let mut st = self.lock();
        self.seek_locked(&mut st, target)
    }

    pub(crate) fn shift_back(&self, amount: Duration) -> SessionResult<Duration> {
        let mut st = self.lock();
        let bytes = st.timeline.to_bytes(amount);
        let target = st.adapter.position().saturating_sub(bytes);
        let offset = self.seek_locked(&mut st, target)?;
        Ok(st.timeline.to_duration(offset))
    }

    pub(crate) fn seek_to(&self, time: Duration) -> SessionResult<Duration> {
        let mut st = self.lock();
        let target = st.timeline.to_bytes(time);
        let offset = self.seek_locked(&mut st, target)?;
        Ok(st.timeline.to_duration(offset))
    }

    fn seek_locked(&self, st: &mut State, target: u64) -> SessionResult<u64> {
        if st.destroyed {
            return Err(SessionError::Destroyed);
        }
        if st.load != AssetLoadState::Loaded {
            return Err(SessionError::NotLoaded);
        }

        let target = st.timeline.total().map_or(target, |total| target.min(total));
        let cursor = self.file.write_cursor();
        let durable = target <= cursor || self.is_readable(target);

        if durable {
            st.adapter.seek(target);
            if st.playback == PlaybackState::Stalled && self.is_readable(target) {
                self.recover(st);
            }
            trace!(target, cursor, "seek within durable bytes");
            return Ok(target);
        }

        if self.policy.allows_forward_seek()
            && let Some(writer) = &st.writer
            && writer.restart_at(target)
        {
            debug!(target, cursor, "forward seek restarts ingestion");
            st.adapter.seek(target);
            return Ok(target);
        }

        debug!(target, cursor, "forward seek clamped to write cursor");
        st.adapter.seek(cursor);
        if !Self::ingestion_ended(st) {
            self.enter_stall(st, cursor);
        } else if matches!(st.playback, PlaybackState::Playing | PlaybackState::Stalled) {
            self.exhausted(st, cursor);
        }
        Ok(cursor)
    }

    // -- teardown --

    /// Stops everything. Returns false when already destroyed.
    ///
    /// The notifier is closed before the state lock is taken: closing waits
    /// for a running listener, which may itself read session state.
    pub(crate) fn destroy(&self) -> bool {
        self.notifier.close();
        let mut st = self.lock();
        if st.destroyed {
            return false;
        }
        st.destroyed = true;

        st.adapter.release();
        st.playback = PlaybackState::Stopped;
        st.wants_playing = false;
        st.stalled_at = None;
        st.writer = None;
        if st.persistence == PersistenceState::Downloading {
            st.persistence = if self.file.path() == self.destination {
                PersistenceState::Persisted
            } else {
                PersistenceState::Failed
            };
        }
        info!(
            persistence = ?st.persistence,
            cursor = self.file.write_cursor(),
            "session destroyed"
        );
        true
    }

    // -- introspection --

    /// No further bytes will reach the temp file.
    fn ingestion_ended(st: &State) -> bool {
        st.persistence == PersistenceState::Failed && !st.promotion_pending
    }

    fn is_readable(&self, offset: u64) -> bool {
        self.file.readable_end(offset) > offset
    }

    pub(crate) fn load_state(&self) -> AssetLoadState {
        self.lock().load
    }

    pub(crate) fn playback_state(&self) -> PlaybackState {
        self.lock().playback
    }

    pub(crate) fn persistence_state(&self) -> PersistenceState {
        self.lock().persistence
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    pub(crate) fn position(&self) -> u64 {
        self.lock().adapter.position()
    }

    pub(crate) fn total_length(&self) -> Option<u64> {
        self.lock().timeline.total().or_else(|| self.file.total_len())
    }

    pub(crate) fn duration(&self) -> Option<Duration> {
        self.lock().timeline.duration()
    }

    pub(crate) fn current_time(&self) -> Duration {
        let st = self.lock();
        st.timeline.to_duration(st.adapter.position())
    }

    /// Time-equivalent of the durable bytes ahead of the playback cursor.
    pub(crate) fn time_buffered(&self) -> Duration {
        let st = self.lock();
        let position = st.adapter.position();
        let front = self.file.readable_end(position);
        st.timeline.to_duration(front.saturating_sub(position))
    }

    pub(crate) fn file(&self) -> &TempFile {
        &self.file
    }

    pub(crate) fn destination(&self) -> &PathBuf {
        &self.destination
    }
}
