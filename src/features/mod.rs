//! Leakage-safe feature construction.
//!
//! Builds the per-date feature table (own-asset, cross-asset, factor
//! and calendar columns) together with the next-period return target.

pub mod engine;
pub mod factor;
pub mod rolling;
pub mod table;

pub use engine::{FeatureConfig, FeatureEngine};
pub use factor::{FactorColumns, FactorConfig, FactorSolver};
pub use table::{FeatureRow, FeatureTable};
