#![forbid(unsafe_code)]

//! Temp location allocation and atomic file placement.
//!
//! [`TempAllocator::move_file`] is the only path by which bytes reach a final
//! location. Same-filesystem moves are a plain `rename`. Cross-device moves
//! copy into a uniquely named sibling of the destination and rename that, so
//! a reader of the destination sees either nothing or the complete file.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::{StorageError, StorageResult};

const DEFAULT_PREFIX: &str = "tapedeck";

/// Allocates temp locations under a single directory.
#[derive(Debug, Clone)]
pub struct TempAllocator {
    dir: PathBuf,
    prefix: String,
}

impl Default for TempAllocator {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl TempAllocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns a fresh location inside the temp directory.
    ///
    /// Names carry a random v4 UUID, so concurrent allocations never collide.
    /// Nothing is created on disk.
    #[must_use]
    pub fn allocate_temp_location(&self) -> PathBuf {
        let name = format!("{}.{}.part", self.prefix, Uuid::new_v4());
        self.dir.join(name)
    }

    /// Writes `data` to `to`, replacing any existing file.
    ///
    /// The bytes go to a temp sibling first and are renamed into place.
    pub fn save_bytes(&self, data: &[u8], to: &Path) -> StorageResult<()> {
        let parent = existing_parent(to)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(to).map_err(|e| StorageError::Io(e.error))?;
        trace!(path = %to.display(), len = data.len(), "bytes saved");
        Ok(())
    }

    /// Moves `from` to `to` atomically.
    ///
    /// Fails without touching `to` when its parent directory is missing.
    /// On any failure `from` is left in place.
    pub fn move_file(&self, from: &Path, to: &Path) -> StorageResult<()> {
        let parent = existing_parent(to)?;
        match fs::rename(from, to) {
            Ok(()) => {
                debug!(from = %from.display(), to = %to.display(), "file moved");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                debug!(
                    from = %from.display(),
                    to = %to.display(),
                    "cross-device move, copying through sibling temp"
                );
                copy_then_rename(from, to, parent)?;
                fs::remove_file(from)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn existing_parent(path: &Path) -> StorageResult<&Path> {
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Err(StorageError::MissingParent(path.to_path_buf())),
    };
    if !parent.is_dir() {
        return Err(StorageError::MissingParent(parent.to_path_buf()));
    }
    Ok(parent)
}

/// The sibling temp is removed on drop if anything fails before `persist`.
fn copy_then_rename(from: &Path, to: &Path, parent: &Path) -> StorageResult<()> {
    let mut source = fs::File::open(from)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    io::copy(&mut source, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(to).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}
