//! Progress reporting for file-by-file aggregation.
//!
//! [`ProgressCallback`] keeps the aggregator independent of how progress is
//! shown. The CLI plugs in `indicatif` bars; library callers and tests use
//! [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates while raw files are aggregated. One unit of
/// work is one raw file.
pub trait ProgressCallback: Send + Sync {
    /// Number of files about to be read.
    fn set_total(&self, total: u64);

    /// `delta` more files are done.
    fn inc(&self, delta: u64);

    /// Names the file currently being read.
    fn set_message(&self, msg: String);

    /// The domain is fully aggregated.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
