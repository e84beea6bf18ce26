#![forbid(unsafe_code)]

//! Playback adapter: the coordinator's handle on the renderer.

use std::fmt;

use tapedeck_storage::TempFile;
use tracing::{debug, trace};

use crate::{
    AssetError, MediaInput, PlaybackCursor, Renderer, RendererEvents, SeekEpoch, SignalSender,
    TrailingReader,
};

#[derive(Clone, Debug, Default)]
pub struct AttachOptions {
    pub hint: Option<String>,
    /// Emit `Advanced` every this many bytes read.
    pub progress_step: Option<u64>,
}

pub struct PlaybackAdapter {
    renderer: Box<dyn Renderer>,
    cursor: PlaybackCursor,
    epoch: SeekEpoch,
    file: Option<TempFile>,
    released: bool,
}

impl fmt::Debug for PlaybackAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackAdapter")
            .field("position", &self.cursor.get())
            .field("attached", &self.file.is_some())
            .field("released", &self.released)
            .finish()
    }
}

impl PlaybackAdapter {
    pub fn new(renderer: impl Renderer) -> Self {
        Self::from_boxed(Box::new(renderer))
    }

    pub fn from_boxed(renderer: Box<dyn Renderer>) -> Self {
        Self {
            renderer,
            cursor: PlaybackCursor::default(),
            epoch: SeekEpoch::default(),
            file: None,
            released: false,
        }
    }

    /// Hands a [`TrailingReader`] over `file` to the renderer.
    pub fn attach(
        &mut self,
        file: &TempFile,
        signals: SignalSender,
        options: AttachOptions,
    ) -> Result<(), AssetError> {
        if self.released {
            return Err(AssetError::Released);
        }
        if self.file.is_some() {
            return Err(AssetError::AlreadyAttached);
        }

        let reader = TrailingReader::open(
            file,
            self.cursor.clone(),
            self.epoch.clone(),
            signals.clone(),
        )?
        .with_progress_step(options.progress_step);
        let input = MediaInput::new(reader, options.hint);

        self.renderer.attach(input, RendererEvents::new(signals))?;
        self.file = Some(file.clone());
        debug!(path = %file.path().display(), "renderer attached");
        Ok(())
    }

    pub fn play(&self) {
        if !self.released {
            self.renderer.play();
        }
    }

    pub fn pause(&self) {
        if !self.released {
            self.renderer.pause();
        }
    }

    pub fn set_volume(&self, volume: f32) {
        if !self.released {
            self.renderer.set_volume(volume);
        }
    }

    /// Repositions the renderer. A read blocked at the old position is
    /// interrupted.
    pub fn seek(&self, offset: u64) {
        if self.released {
            return;
        }
        self.renderer.seek(offset);
        self.cursor.set(offset);
        let epoch = self.epoch.bump();
        if let Some(file) = &self.file {
            file.wake_waiters();
        }
        trace!(offset, epoch, "adapter seek");
    }

    /// Current PlaybackCursor.
    pub fn position(&self) -> u64 {
        self.cursor.get()
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.file.is_some()
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.renderer.release();
        self.epoch.bump();
        if let Some(file) = &self.file {
            file.wake_waiters();
        }
        debug!("renderer released");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use tapedeck_storage::{TempAllocator, TempFileOptions};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use unimock::{MockFn, Unimock, matching};

    use super::*;
    use crate::{RendererMock, signal_channel};

    fn temp_file(dir: &TempDir) -> TempFile {
        let alloc = TempAllocator::new(dir.path());
        TempFile::create(
            &alloc,
            TempFileOptions::new(alloc.allocate_temp_location(), CancellationToken::new()),
        )
        .unwrap()
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[test]
    fn seek_moves_cursor_and_forwards() {
        let dir = TempDir::new().unwrap();
        let file = temp_file(&dir);
        let renderer = Unimock::new((
            RendererMock::attach
                .next_call(matching!(_, _))
                .answers(&|_, _, _| Ok(())),
            RendererMock::seek.next_call(matching!(4_096)).returns(()),
            RendererMock::release.next_call(matching!()).returns(()),
        ));

        let mut adapter = PlaybackAdapter::new(renderer);
        let (tx, _rx) = signal_channel();
        adapter.attach(&file, tx, AttachOptions::default()).unwrap();
        adapter.seek(4_096);
        assert_eq!(adapter.position(), 4_096);

        adapter.release();
        adapter.release();
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[test]
    fn rejected_attach_is_reported() {
        let dir = TempDir::new().unwrap();
        let file = temp_file(&dir);
        let renderer = Unimock::new(
            RendererMock::attach
                .next_call(matching!(_, _))
                .answers(&|_, _, _| Err(AssetError::rejected("unsupported container"))),
        );

        let mut adapter = PlaybackAdapter::new(renderer);
        let (tx, _rx) = signal_channel();
        let err = adapter
            .attach(&file, tx, AttachOptions::default())
            .unwrap_err();
        assert!(matches!(err, AssetError::Rejected { .. }));
        assert!(!adapter.is_attached());
    }

    #[test]
    fn released_adapter_ignores_transport() {
        let renderer = Unimock::new(RendererMock::release.next_call(matching!()).returns(()));
        let mut adapter = PlaybackAdapter::new(renderer);
        adapter.release();

        adapter.play();
        adapter.pause();
        adapter.seek(10);
        adapter.set_volume(0.5);
        assert_eq!(adapter.position(), 0);
    }
}
