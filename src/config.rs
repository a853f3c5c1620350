//! Run configuration, loaded from TOML.
//!
//! ```toml
//! data_dir = "data"
//! target = "AAPL"
//! market = "QQQ"
//! price_field = "adj_close"
//! peer_count = 5
//!
//! [windows.train]
//! start = "2018-01-01"
//! end = "2018-12-31"
//! [windows.validation]
//! start = "2019-01-01"
//! end = "2019-12-31"
//! [windows.test]
//! start = "2020-01-01"
//! end = "2020-03-31"
//!
//! [[models]]
//! kind = "random_forest"
//! n_estimators = 200
//! ```
//!
//! `price_field` has no default: every run states which price it uses.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::PriceField;
use crate::error::ForecastError;
use crate::features::FeatureConfig;
use crate::models::ModelSpec;
use crate::report::DecisionThresholds;
use crate::walkforward::{SplitWindows, StackerConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Invalid(#[from] ForecastError),
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_peer_count() -> usize {
    5
}

fn default_models() -> Vec<ModelSpec> {
    ModelSpec::default_pool()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding `<TICKER>.csv` files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    pub target: String,
    /// Market benchmark ticker. Never selected as a sector peer.
    pub market: String,
    pub price_field: PriceField,
    #[serde(default = "default_peer_count")]
    pub peer_count: usize,
    /// Peer candidates; all other loaded tickers when absent.
    #[serde(default)]
    pub candidates: Option<Vec<String>>,
    pub windows: SplitWindows,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub stacker: StackerConfig,
    #[serde(default = "default_models")]
    pub models: Vec<ModelSpec>,
    #[serde(default)]
    pub decision: DecisionThresholds,
}

impl PipelineConfig {
    pub fn new(
        target: impl Into<String>,
        market: impl Into<String>,
        price_field: PriceField,
        windows: SplitWindows,
    ) -> Self {
        Self {
            data_dir: default_data_dir(),
            target: target.into(),
            market: market.into(),
            price_field,
            peer_count: default_peer_count(),
            candidates: None,
            windows,
            features: FeatureConfig::default(),
            stacker: StackerConfig::default(),
            models: default_models(),
            decision: DecisionThresholds::default(),
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_peer_count(mut self, k: usize) -> Self {
        self.peer_count = k;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = Some(candidates);
        self
    }

    pub fn with_models(mut self, models: Vec<ModelSpec>) -> Self {
        self.models = models;
        self
    }

    /// Tickers the run needs loaded: target, market, then candidates.
    pub fn required_tickers(&self) -> Option<Vec<String>> {
        let candidates = self.candidates.as_ref()?;
        let mut tickers = vec![self.target.clone(), self.market.clone()];
        tickers.extend(candidates.iter().cloned());
        tickers.sort();
        tickers.dedup();
        Some(tickers)
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.target.trim().is_empty() {
            return Err(ForecastError::config("target ticker is empty"));
        }
        if self.market.trim().is_empty() {
            return Err(ForecastError::config("market ticker is empty"));
        }
        if self.target == self.market {
            return Err(ForecastError::config("target and market must differ"));
        }
        if self.peer_count == 0 {
            return Err(ForecastError::config("peer_count must be positive"));
        }
        if self.models.is_empty() {
            return Err(ForecastError::config("at least one base model is required"));
        }
        if self.stacker.n_splits == 0 {
            return Err(ForecastError::config("stacker.n_splits must be positive"));
        }
        self.windows.validate()?;
        self.features.validate()?;
        self.decision.validate()?;
        Ok(())
    }

    /// Load and validate a TOML config file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FactorSolver;
    use crate::walkforward::DateWindow;
    use chrono::NaiveDate;

    const MINIMAL: &str = r#"
        target = "AAPL"
        market = "QQQ"
        price_field = "adj_close"

        [windows.train]
        start = "2018-01-01"
        end = "2018-12-31"
        [windows.validation]
        start = "2019-01-01"
        end = "2019-12-31"
        [windows.test]
        start = "2020-01-01"
        end = "2020-03-31"
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = PipelineConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.price_field, PriceField::AdjClose);
        assert_eq!(config.peer_count, 5);
        assert_eq!(config.models.len(), 3);
        assert_eq!(config.stacker.n_splits, 5);
        assert_eq!(config.features.factor.solver, FactorSolver::Exact);
        assert_eq!(
            config.windows.test.start,
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
        );
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_bundled_example_config() {
        let config = PipelineConfig::from_toml_str(include_str!("../config/default.toml")).unwrap();
        assert_eq!(config.target, "AAPL");
        assert_eq!(config.required_tickers().map(|t| t.len()), Some(12));
        assert_eq!(config.models.len(), 3);
        assert_eq!(config.decision, DecisionThresholds::default());
    }

    #[test]
    fn test_price_field_is_required() {
        let without = MINIMAL.replace("price_field = \"adj_close\"", "");
        assert!(matches!(
            PipelineConfig::from_toml_str(&without),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_models_and_solver_override() {
        let toml = format!(
            "{}\n{}",
            MINIMAL,
            r#"
            [features.factor]
            solver = "incremental"

            [[models]]
            kind = "gradient_boosting"
            learning_rate = 0.1

            [[models]]
            kind = "elastic_net"
            "#
        );
        let config = PipelineConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.features.factor.solver, FactorSolver::Incremental);
        assert_eq!(config.models.len(), 2);
        assert!(matches!(&config.models[0], ModelSpec::GradientBoosting(c) if c.learning_rate == 0.1));
    }

    #[test]
    fn test_overlapping_windows_rejected() {
        let bad = MINIMAL.replace("start = \"2019-01-01\"", "start = \"2018-06-01\"");
        assert!(matches!(
            PipelineConfig::from_toml_str(&bad),
            Err(ConfigError::Invalid(ForecastError::Configuration(_)))
        ));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        let config = PipelineConfig::new(
            "AAA",
            "MKT",
            PriceField::Close,
            SplitWindows::new(
                DateWindow::new(d(2018, 1, 1), d(2018, 12, 31)),
                DateWindow::new(d(2019, 1, 1), d(2019, 12, 31)),
                DateWindow::new(d(2020, 1, 1), d(2020, 6, 30)),
            ),
        )
        .with_peer_count(3);
        let text = config.to_toml_string().unwrap();
        let back = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.peer_count, 3);
        assert_eq!(back.price_field, PriceField::Close);
        assert_eq!(back.models, config.models);
    }
}
