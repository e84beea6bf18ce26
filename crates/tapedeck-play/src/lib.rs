#![forbid(unsafe_code)]

//! `tapedeck-play`
//!
//! The playback side of a session.
//!
//! - [`Renderer`]: boundary to the external decode/render pipeline
//! - [`TrailingReader`]: the renderer's view of the temp file; never returns
//!   bytes that are not durable and reports when it has to wait
//! - [`PlaybackAdapter`]: transport calls and seeks as the coordinator issues them
//! - [`ByteTimeline`]: byte offsets to media time and back

mod adapter;
mod error;
mod reader;
mod renderer;
mod signal;
mod timeline;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use adapter::{AttachOptions, PlaybackAdapter};
pub use error::AssetError;
pub use reader::{PlaybackCursor, SeekEpoch, TrailingReader};
pub use renderer::{MediaInput, Renderer};
#[cfg(any(test, feature = "test-utils"))]
pub use renderer::RendererMock;
pub use signal::{AdapterSignal, RendererEvents, SignalReceiver, SignalSender, signal_channel};
pub use timeline::{ByteTimeline, DEFAULT_NOMINAL_BYTE_RATE};
pub use types::{AssetLoadState, PlaybackState};
