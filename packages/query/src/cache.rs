//! Bounded artifact cache.
//!
//! Entries are keyed by path and tagged with the file's modification time
//! and length at load time. A lookup reuses an entry only while both still
//! match, so a pipeline run that replaces an artifact is picked up on the
//! next query. At capacity the least recently used entry is evicted.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use asie_store::StoreError;

/// Default number of artifacts kept per cache.
pub const DEFAULT_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Result<Self, StoreError> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Self {
                modified: meta.modified().ok(),
                len: meta.len(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

struct Entry<T> {
    path: PathBuf,
    stamp: FileStamp,
    value: Arc<T>,
}

/// Cache of decoded artifacts of one type.
pub struct ArtifactCache<T> {
    capacity: usize,
    /// Most recently used first.
    entries: Mutex<Vec<Entry<T>>>,
}

impl<T> Default for ArtifactCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T> ArtifactCache<T> {
    /// Creates a cache holding at most `capacity` artifacts (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the artifact at `path`, loading it with `load` if it is not
    /// cached or has changed on disk since it was cached.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `path` does not exist (any stale
    /// entry is dropped), or whatever `load` returns.
    pub fn get_or_load<F>(&self, path: &Path, load: F) -> Result<Arc<T>, StoreError>
    where
        F: FnOnce(&Path) -> Result<T, StoreError>,
    {
        let stamp = match FileStamp::of(path) {
            Ok(stamp) => stamp,
            Err(e) => {
                self.invalidate(path);
                return Err(e);
            }
        };

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = entries.iter().position(|e| e.path == path) {
            let entry = entries.remove(pos);
            if entry.stamp == stamp {
                let value = Arc::clone(&entry.value);
                entries.insert(0, entry);
                return Ok(value);
            }
            log::debug!("[cache] {} changed on disk, reloading", path.display());
        }

        let value = Arc::new(load(path)?);
        entries.insert(
            0,
            Entry {
                path: path.to_path_buf(),
                stamp,
                value: Arc::clone(&value),
            },
        );
        if entries.len() > self.capacity
            && let Some(evicted) = entries.pop()
        {
            log::debug!("[cache] evicted {}", evicted.path.display());
        }
        Ok(value)
    }

    /// Drops the entry for `path`, if any.
    pub fn invalidate(&self, path: &Path) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|e| e.path != path);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
