//! Forecast evaluation.
//!
//! - Mean absolute error, root mean squared error
//! - Sign (direction) accuracy
//! - Naive zero-return baseline for comparison

pub mod calculator;

pub use calculator::{ForecastMetrics, MetricsCalculator, MetricsTable, ENSEMBLE_MODEL, NAIVE_MODEL};
