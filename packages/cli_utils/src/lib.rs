#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the asie toolchain.
//!
//! Provides an `indicatif`-backed [`ProgressCallback`] for raw-file
//! aggregation, plus [`init_logger`] which sets up `indicatif-log-bridge` so
//! that `log::info!` and friends are suspended while progress bars redraw.

use std::sync::Arc;
use std::time::Duration;

use asie_ingest::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style to switch to once `set_total()` provides a known length.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Creates a bar for one domain's raw files. It starts as a spinner
    /// while the directory is listed and becomes a full bar with ETA once
    /// [`ProgressCallback::set_total()`] reports the file count.
    #[must_use]
    pub fn files_bar(multi: &MultiProgress, domain: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::files(multi, domain))
    }

    fn files(multi: &MultiProgress, domain: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix(domain.to_string());
        bar.set_message("listing files");

        let bar_style = ProgressStyle::with_template(
            "  {prefix:12} {wide_bar:.cyan/dim} {pos}/{len} files [{eta}] {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self { bar, bar_style }
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // already set, e.g. in tests

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_bar_tracks_files() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::files(&multi, "enrolment");
        progress.set_total(3);
        progress.inc(2);
        progress.set_message("part_1.csv".to_string());
        assert_eq!(progress.bar.position(), 2);
        assert_eq!(progress.bar.length(), Some(3));

        progress.inc(1);
        progress.finish("3 files".to_string());
        assert!(progress.bar.is_finished());
        assert_eq!(progress.bar.message(), "3 files");
    }
}
