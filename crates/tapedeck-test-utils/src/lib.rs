#![forbid(unsafe_code)]
#![allow(
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation,
    reason = "test utility crate"
)]

//! Shared test utilities for the tapedeck workspace.

pub mod asset_server;
pub mod http_server;
pub mod rng;
pub mod scripted_net;

pub use asset_server::{AssetServer, AssetServerLog};
pub use http_server::TestHttpServer;
pub use rng::{Xorshift64, payload};
pub use scripted_net::{ChunkGate, ScriptedNet};

/// Installs a `tracing` subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
