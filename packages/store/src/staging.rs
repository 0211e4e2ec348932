//! Staged artifact commits and the single-writer run lock.
//!
//! A run writes every artifact to a temporary file next to its target and
//! only renames them into place once all writes have succeeded. Dropping a
//! [`Staging`] without committing deletes the temporary files, so a failed
//! run leaves the previous artifact set untouched.

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use arrow_array::RecordBatch;
use fs2::FileExt;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use tempfile::NamedTempFile;

use crate::StoreError;
use crate::paths::{LOCK_FILE, ensure_dir};

/// Artifacts written but not yet moved into place.
#[derive(Default)]
pub struct Staging {
    staged: Vec<(NamedTempFile, PathBuf)>,
}

impl Staging {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets staged so far, in staging order.
    pub fn targets(&self) -> impl Iterator<Item = &Path> {
        self.staged.iter().map(|(_, target)| target.as_path())
    }

    fn temp_for(target: &Path) -> Result<NamedTempFile, StoreError> {
        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        ensure_dir(dir)?;
        Ok(tempfile::Builder::new()
            .prefix(".asie-")
            .suffix(".tmp")
            .tempfile_in(dir)?)
    }

    /// Writes `batch` as a single-row-group parquet file destined for
    /// `target`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Parquet`] if encoding fails or
    /// [`StoreError::Io`] if the temporary file cannot be created.
    pub fn stage_batch(&mut self, target: &Path, batch: &RecordBatch) -> Result<(), StoreError> {
        let temp = Self::temp_for(target)?;
        let props = WriterProperties::builder().build();
        let mut writer = ArrowWriter::try_new(
            BufWriter::new(temp.as_file().try_clone()?),
            batch.schema(),
            Some(props),
        )?;
        writer.write(batch)?;
        writer.into_inner()?.flush()?;

        log::debug!(
            "[store] staged {} row(s) for {}",
            batch.num_rows(),
            target.display()
        );
        self.staged.push((temp, target.to_path_buf()));
        Ok(())
    }

    /// Stages raw bytes (e.g. a markdown report) for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the temporary file cannot be written.
    pub fn stage_bytes(&mut self, target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let mut temp = Self::temp_for(target)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        self.staged.push((temp, target.to_path_buf()));
        Ok(())
    }

    /// Moves every staged file onto its target, returning the targets.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if a rename fails. Files renamed before
    /// the failure stay in place; the rest are discarded.
    pub fn commit(self) -> Result<Vec<PathBuf>, StoreError> {
        let mut committed = Vec::with_capacity(self.staged.len());
        for (temp, target) in self.staged {
            temp.persist(&target).map_err(|e| StoreError::Io(e.error))?;
            log::debug!("[store] committed {}", target.display());
            committed.push(target);
        }
        Ok(committed)
    }
}

/// Exclusive lock on a processed directory, held for the duration of a
/// run. Released on drop.
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Takes the lock for `dir` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Busy`] if another run holds the lock, or
    /// [`StoreError::Io`] if the lock file cannot be opened.
    pub fn acquire(dir: &Path) -> Result<Self, StoreError> {
        ensure_dir(dir)?;
        let path = dir.join(LOCK_FILE);
        let file = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                log::debug!("[store] locked {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(StoreError::Busy { path })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("[store] failed to unlock {}: {e}", self.path.display());
        }
    }
}
