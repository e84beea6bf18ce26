//! Test renderers.
//!
//! [`RendererMock`] is the unimock API for call-level expectations.
//! [`ScriptedRenderer`] is a real renderer that pulls bytes through the
//! [`MediaInput`] on its own thread at a fixed pace, which is what
//! end-to-end session tests need.

use std::{
    fmt,
    io::{self, Read, Seek, SeekFrom},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use portable_atomic::AtomicF32;
use tracing::{debug, trace, warn};

pub use crate::renderer::RendererMock;
use crate::{AssetError, MediaInput, Renderer, RendererEvents};

#[derive(Clone, Copy, Debug, PartialEq)]
enum Command {
    Play,
    Pause,
    Seek(u64),
    Release,
}

struct Shared {
    commands: Mutex<Option<kanal::Sender<Command>>>,
    volume: AtomicF32,
    playing: AtomicBool,
    rendered: AtomicU64,
    seeks: Mutex<Vec<u64>>,
}

/// Renderer that "plays" by reading `read_size` bytes per tick.
///
/// On attach it reads `probe_bytes` from the input, rewinds and reports
/// ready with the configured duration. Clones share state, so a test can
/// keep one and hand the other to the session.
#[derive(Clone)]
pub struct ScriptedRenderer {
    shared: Arc<Shared>,
    duration: Option<Duration>,
    read_size: usize,
    tick: Duration,
    probe_bytes: usize,
    reject: Option<String>,
}

impl fmt::Debug for ScriptedRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedRenderer")
            .field("playing", &self.is_playing())
            .field("rendered", &self.rendered_bytes())
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

impl Default for ScriptedRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                commands: Mutex::new(None),
                volume: AtomicF32::new(1.0),
                playing: AtomicBool::new(false),
                rendered: AtomicU64::new(0),
                seeks: Mutex::new(Vec::new()),
            }),
            duration: None,
            read_size: 16 * 1024,
            tick: Duration::from_millis(1),
            probe_bytes: 1,
            reject: None,
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    #[must_use]
    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size.max(1);
        self
    }

    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    #[must_use]
    pub fn with_probe_bytes(mut self, probe_bytes: usize) -> Self {
        self.probe_bytes = probe_bytes.max(1);
        self
    }

    /// `attach` fails with [`AssetError::Rejected`].
    #[must_use]
    pub fn rejecting(mut self, reason: impl Into<String>) -> Self {
        self.reject = Some(reason.into());
        self
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume.load(Ordering::Relaxed)
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    /// Bytes consumed while playing.
    pub fn rendered_bytes(&self) -> u64 {
        self.shared.rendered.load(Ordering::Acquire)
    }

    /// Seek offsets in the order they were applied.
    pub fn seeks(&self) -> Vec<u64> {
        self.shared.seeks.lock().clone()
    }

    fn send(&self, command: Command) {
        if let Some(tx) = self.shared.commands.lock().as_ref()
            && tx.send(command).is_err()
        {
            trace!(?command, "renderer thread gone");
        }
    }
}

impl Renderer for ScriptedRenderer {
    fn attach(&self, input: MediaInput, events: RendererEvents) -> Result<(), AssetError> {
        if let Some(reason) = &self.reject {
            return Err(AssetError::rejected(reason.clone()));
        }
        let mut slot = self.shared.commands.lock();
        if slot.is_some() {
            return Err(AssetError::AlreadyAttached);
        }

        let (tx, rx) = kanal::unbounded();
        let worker = Worker {
            input,
            events,
            commands: rx,
            shared: Arc::clone(&self.shared),
            duration: self.duration,
            read_size: self.read_size,
            tick: self.tick,
            probe_bytes: self.probe_bytes,
        };
        thread::Builder::new()
            .name("tapedeck-renderer".into())
            .spawn(move || worker.run())
            .map_err(|e| AssetError::rejected(format!("cannot start renderer: {e}")))?;
        *slot = Some(tx);
        Ok(())
    }

    fn play(&self) {
        self.send(Command::Play);
    }

    fn pause(&self) {
        self.send(Command::Pause);
    }

    fn seek(&self, offset: u64) {
        self.send(Command::Seek(offset));
    }

    fn set_volume(&self, volume: f32) {
        self.shared.volume.store(volume, Ordering::Relaxed);
    }

    fn release(&self) {
        if let Some(tx) = self.shared.commands.lock().take() {
            let _ = tx.send(Command::Release);
        }
    }
}

struct Worker {
    input: MediaInput,
    events: RendererEvents,
    commands: kanal::Receiver<Command>,
    shared: Arc<Shared>,
    duration: Option<Duration>,
    read_size: usize,
    tick: Duration,
    probe_bytes: usize,
}

enum Step {
    Continue,
    Stop,
}

impl Worker {
    fn run(mut self) {
        match self.probe() {
            Ok(true) => self.events.ready(self.duration),
            Ok(false) => return,
            Err(e) => {
                self.events.failed(e.to_string());
                return;
            }
        }

        let mut buf = vec![0u8; self.read_size];
        let mut at_end = false;
        loop {
            if let Step::Stop = self.drain_commands(&mut at_end) {
                break;
            }
            if !self.shared.playing.load(Ordering::Acquire) || at_end {
                thread::sleep(self.tick);
                continue;
            }

            match self.input.read(&mut buf) {
                Ok(0) => {
                    at_end = true;
                    self.shared.playing.store(false, Ordering::Release);
                    debug!(position = self.input.position(), "renderer reached end");
                    self.events.finished();
                }
                Ok(n) => {
                    self.shared.rendered.fetch_add(n as u64, Ordering::AcqRel);
                    thread::sleep(self.tick);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "renderer read failed");
                    self.shared.playing.store(false, Ordering::Release);
                    self.events.failed(e.to_string());
                    break;
                }
            }
        }
        trace!("renderer thread exit");
    }

    /// Reads the header bytes. `Ok(false)` means released while probing.
    fn probe(&mut self) -> io::Result<bool> {
        let mut header = vec![0u8; self.probe_bytes];
        let mut filled = 0;
        while filled < header.len() {
            if let Step::Stop = self.drain_commands(&mut false) {
                return Ok(false);
            }
            match self.input.read(&mut header[filled..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "input ended before header",
                    ));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        self.input.seek(SeekFrom::Start(0))?;
        Ok(true)
    }

    fn drain_commands(&mut self, at_end: &mut bool) -> Step {
        loop {
            match self.commands.try_recv() {
                Ok(Some(Command::Play)) => {
                    *at_end = false;
                    self.shared.playing.store(true, Ordering::Release);
                }
                Ok(Some(Command::Pause)) => self.shared.playing.store(false, Ordering::Release),
                Ok(Some(Command::Seek(offset))) => {
                    *at_end = false;
                    if let Err(e) = self.input.seek(SeekFrom::Start(offset)) {
                        warn!(offset, error = %e, "renderer seek rejected");
                    } else {
                        self.shared.seeks.lock().push(offset);
                    }
                }
                Ok(Some(Command::Release)) | Err(_) => {
                    self.shared.playing.store(false, Ordering::Release);
                    return Step::Stop;
                }
                Ok(None) => return Step::Continue,
            }
        }
    }
}
