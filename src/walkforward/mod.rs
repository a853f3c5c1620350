//! Walk-forward validation and stacking.
//!
//! - Windows: train / validation / test date ranges
//! - Folds: expanding time-series splits over the validation rows
//! - Stacker: OOF generation, meta training, full refit, frozen prediction

pub mod folds;
pub mod oof;
pub mod stacker;
pub mod windows;

pub use folds::{time_series_folds, Fold};
pub use oof::OofMatrix;
pub use stacker::{Forecast, StackerConfig, StackerState, WalkForwardStacker};
pub use windows::{DateWindow, SplitWindows};
