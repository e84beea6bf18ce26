#![forbid(unsafe_code)]

//! # Tapedeck
//!
//! Plays a remote media stream while writing every received byte to a local
//! file, and promotes that file to its destination once it is complete.
//!
//! ## Quick start
//!
//! ```ignore
//! use tapedeck::prelude::*;
//!
//! let config = SessionConfig::new(url, "/music/track.mp3".into());
//! let session = Session::open(config, my_renderer).await?;
//!
//! let mut events = session.subscribe();
//! session.play();
//! while let Ok(n) = events.recv().await {
//!     if n.event == SessionEvent::PlaybackFinished {
//!         break;
//!     }
//! }
//! ```

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod events {
    pub use tapedeck_events::*;
}

pub mod net {
    pub use tapedeck_net::*;
}

pub mod play {
    pub use tapedeck_play::*;
}

pub mod storage {
    pub use tapedeck_storage::*;
}

pub mod stream {
    pub use tapedeck_stream::*;
}

// ── Session ─────────────────────────────────────────────────────────────

mod config;
mod coordinator;
mod driver;
mod error;
mod session;

pub use config::{SeekPolicy, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use session::Session;

// ── Prelude ─────────────────────────────────────────────────────────────

pub mod prelude {
    pub use tapedeck_events::{EventBus, EventKind, ListenerId, Notification, SessionEvent};
    pub use tapedeck_play::{AssetLoadState, MediaInput, PlaybackState, Renderer, RendererEvents};
    pub use tapedeck_stream::PersistenceState;

    pub use crate::{SeekPolicy, Session, SessionConfig, SessionError, SessionResult};
}
