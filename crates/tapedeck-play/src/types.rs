#![forbid(unsafe_code)]

/// Transport state exposed to callers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
    /// Playback reached the write front and waits for bytes.
    Stalled,
}

impl PlaybackState {
    /// Whether the renderer is positioned inside the media, playing or not.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

/// Whether the asset became playable at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AssetLoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

impl AssetLoadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Loaded | Self::Failed)
    }
}
