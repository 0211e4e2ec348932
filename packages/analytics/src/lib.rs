#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Time-axis analytics over a metrics panel.
//!
//! Both stages work one geography at a time, over that geography's rows in
//! period order. [`anomalies`] scores every observation against the
//! geography's own history; [`forecast`] extrapolates a straight-line trend.
//! Metrics are a closed enum, so neither stage can fail.

pub mod anomalies;
pub mod forecast;

pub use anomalies::{DEFAULT_ZSCORE_THRESHOLD, detect_anomalies};
pub use forecast::{DEFAULT_HORIZON, DEFAULT_MIN_HISTORY, forecast_metrics};
