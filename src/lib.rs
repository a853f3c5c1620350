pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod sector;
pub mod validation;
pub mod walkforward;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{ConfigError, PipelineConfig};
pub use data::{DataLoader, PriceBar, PriceField, PriceSeries, ReturnSeries, Universe};
pub use error::{ForecastError, ForecastResult};
pub use features::{FeatureConfig, FeatureEngine, FeatureRow, FeatureTable};
pub use metrics::{ForecastMetrics, MetricsCalculator, MetricsTable};
pub use models::{Forecaster, ModelFactory, ModelPool, ModelSpec};
pub use pipeline::{ForecastPipeline, PipelineOutput};
pub use progress::{CancellationToken, NoProgress, ProgressHook};
pub use report::{Decision, DecisionThresholds, PredictionRecord, RunReport};
pub use sector::{SectorIndex, SectorIndexBuilder};
pub use validation::DataIntegrityValidator;
pub use walkforward::{DateWindow, Forecast, SplitWindows, StackerState, WalkForwardStacker};
