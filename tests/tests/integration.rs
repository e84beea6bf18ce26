//! End-to-end tests for tapedeck over a local HTTP server.

mod common;
mod tapedeck_session;
