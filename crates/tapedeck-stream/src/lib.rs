#![forbid(unsafe_code)]

//! `tapedeck-stream`
//!
//! Moves asset bytes from the network into the session temp file.
//!
//! - [`IngestionPipe`]: one ordered, non-restartable body stream
//! - [`ChunkWriter`]: pipe -> durable `write_at`, one item per chunk
//! - [`PersistenceWriter`]: owns the pipe, reports progress, handles ranged
//!   restarts and gap filling, and promotes the finished file exactly once

mod error;
mod persist;
mod pipe;
mod writer;

pub use error::{PersistError, WriterError};
pub use persist::{
    IngestMode, PersistenceConfig, PersistenceHandle, PersistenceState, PersistenceWriter,
    WriterCommand, WriterEvent,
};
pub use pipe::{IngestionPipe, PipeSource};
pub use writer::{ChunkWriter, WriterItem};
