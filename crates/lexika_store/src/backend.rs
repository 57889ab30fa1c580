//! Persistence backend trait and implementations.

use crate::error::StoreResult;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};

/// A low-level persistence backend for the local store.
///
/// Backends are **opaque byte stores**: they persist and reload a single
/// snapshot blob. The store owns all format interpretation - backends do
/// not understand records, indexes, or the sync queue.
///
/// # Invariants
///
/// - `load` returns exactly the bytes of the most recent successful `save`,
///   or `None` if nothing has been saved
/// - `save` is atomic: a crash mid-save never leaves a partial snapshot
///   visible to a later `load`
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`MemoryBackend`] - For testing
/// - [`FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Loads the persisted snapshot, if any.
    fn load(&self) -> StoreResult<Option<Vec<u8>>>;

    /// Persists a snapshot, replacing any previous one.
    fn save(&self, bytes: &[u8]) -> StoreResult<()>;
}

/// An in-memory backend for tests and ephemeral stores.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    snapshot: Mutex<Option<Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, bytes: &[u8]) -> StoreResult<()> {
        *self.snapshot.lock() = Some(bytes.to_vec());
        Ok(())
    }
}

/// A file-backed snapshot backend.
///
/// Saves write to a sibling temporary file and rename into place, so a
/// crash during `save` leaves the previous snapshot intact.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Creates a backend persisting to the given path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, bytes: &[u8]) -> StoreResult<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
