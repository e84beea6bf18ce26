#![forbid(unsafe_code)]

use std::{fmt, time::Duration};

use tracing::trace;

/// What the playback side reports to the coordinator.
///
/// `Ready`, `Failed` and `Finished` come from the renderer through
/// [`RendererEvents`]. `Starved`, `Refilled` and `Advanced` come from the
/// trailing reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdapterSignal {
    Ready { duration: Option<Duration> },
    Failed { reason: String },
    Finished,
    /// A read found no durable byte at `offset` and is about to block.
    Starved { offset: u64 },
    /// The blocked read at `offset` can continue.
    Refilled { offset: u64 },
    /// The read position crossed another progress step.
    Advanced { position: u64 },
}

pub type SignalSender = kanal::Sender<AdapterSignal>;
pub type SignalReceiver = kanal::Receiver<AdapterSignal>;

/// Unbounded: producers are renderer threads that must never block on the
/// coordinator.
pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    kanal::unbounded()
}

/// Handle a renderer uses to report transport events. Cheap to clone and
/// usable from any thread.
#[derive(Clone)]
pub struct RendererEvents {
    tx: SignalSender,
}

impl fmt::Debug for RendererEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererEvents")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl RendererEvents {
    pub fn new(tx: SignalSender) -> Self {
        Self { tx }
    }

    /// The asset is decodable and playback can start.
    pub fn ready(&self, duration: Option<Duration>) {
        self.send(AdapterSignal::Ready { duration });
    }

    /// The asset cannot be rendered.
    pub fn failed(&self, reason: impl Into<String>) {
        self.send(AdapterSignal::Failed {
            reason: reason.into(),
        });
    }

    /// Rendering reached the end of the input.
    pub fn finished(&self) {
        self.send(AdapterSignal::Finished);
    }

    fn send(&self, signal: AdapterSignal) {
        if self.tx.send(signal).is_err() {
            trace!("renderer event dropped, coordinator gone");
        }
    }
}
