#![forbid(unsafe_code)]

//! `tapedeck-storage`
//!
//! Local storage primitives for tapedeck.
//!
//! - [`TempAllocator`]: collision-free temp locations, atomic `save_bytes`
//!   and `move_file` (the only way a file reaches its final path)
//! - [`TempFile`]: a growing, durably written temp file with a monotonic
//!   write cursor and blocking `wait_range` via `Condvar`
//! - [`Coverage`]: byte-range coverage used to gate promotion

mod coverage;
mod error;
mod file;
mod temp;

pub use coverage::{Coverage, MemCoverage};
pub use error::{StorageError, StorageResult};
pub use file::{FileStatus, TempFile, TempFileOptions, WaitOutcome};
pub use temp::TempAllocator;
