//! Validation of loaded price data.
//!
//! Checks date continuity, price validity, bar consistency and volume
//! for each series before features are built.

pub mod data_integrity;

pub use data_integrity::{CheckResult, DataIntegrityReport, DataIntegrityValidator};
