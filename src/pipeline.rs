//! End-to-end forecasting run.
//!
//! Sector peers are fixed on the training window, features are built once
//! over the full timeline, the stacker learns its combiner on validation
//! OOF predictions, and frozen models forecast the test window.

use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::data::{DataLoader, LoaderError, Universe};
use crate::error::{ForecastError, ForecastResult};
use crate::features::{FeatureEngine, FeatureTable};
use crate::metrics::MetricsCalculator;
use crate::models::ModelPool;
use crate::progress::{NoProgress, ProgressHook};
use crate::report::{PredictionRecord, RunReport};
use crate::sector::{SectorIndex, SectorIndexBuilder};
use crate::validation::{DataIntegrityReport, DataIntegrityValidator};
use crate::walkforward::{Forecast, WalkForwardStacker};

/// Results of one run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub sector: SectorIndex,
    pub features: FeatureTable,
    pub forecasts: Vec<Forecast>,
    pub report: RunReport,
}

pub struct ForecastPipeline {
    config: PipelineConfig,
    pool: ModelPool,
}

impl ForecastPipeline {
    pub fn new(config: PipelineConfig) -> ForecastResult<Self> {
        config.validate()?;
        let pool = ModelPool::from_specs(&config.models);
        Ok(Self { config, pool })
    }

    /// Replace the base model pool built from the config.
    pub fn with_pool(mut self, pool: ModelPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the tickers this run needs from `config.data_dir`.
    pub fn load_universe(&self) -> Result<Universe, LoaderError> {
        let loader = DataLoader::new(&self.config.data_dir);
        match self.config.required_tickers() {
            Some(tickers) => loader.load_universe(&tickers),
            None => loader.load_all(),
        }
    }

    /// Run integrity checks and log every failed check.
    ///
    /// Ordering problems never reach this point: `PriceSeries` rejects them
    /// at construction.
    pub fn check_data(&self, universe: &Universe) -> Vec<DataIntegrityReport> {
        let validator = DataIntegrityValidator::new(self.config.price_field);
        let reports = validator.validate_universe(universe);
        for report in &reports {
            if report.all_passed() {
                debug!("{}", report.summary());
                continue;
            }
            for check in report.failed_checks() {
                warn!(
                    "{} {}: {}{}",
                    report.ticker,
                    check.name,
                    check.message,
                    check
                        .details
                        .as_ref()
                        .map(|d| format!(" ({})", d))
                        .unwrap_or_default()
                );
            }
        }
        reports
    }

    /// Select peers on the training window and build the sector index.
    pub fn select_peers(&self, universe: &Universe) -> ForecastResult<SectorIndex> {
        let mut builder = SectorIndexBuilder::new(
            self.config.target.clone(),
            self.config.windows.train,
            self.config.peer_count,
            self.config.price_field,
        )
        .exclude(self.config.market.clone());
        if let Some(candidates) = &self.config.candidates {
            builder = builder.with_candidates(candidates.clone());
        }
        builder.build(universe)
    }

    pub fn run(&self, universe: &Universe) -> ForecastResult<PipelineOutput> {
        self.run_with(universe, &NoProgress)
    }

    pub fn run_with(
        &self,
        universe: &Universe,
        hook: &dyn ProgressHook,
    ) -> ForecastResult<PipelineOutput> {
        let cfg = &self.config;
        let windows = cfg.windows;
        let lookup = |ticker: &str| {
            universe
                .get(ticker)
                .ok_or_else(|| ForecastError::config(format!("ticker '{}' not loaded", ticker)))
        };
        let asset = lookup(&cfg.target)?;
        let market = lookup(&cfg.market)?;

        self.check_data(universe);

        let sector = self.select_peers(universe)?;
        info!(
            "Sector for {}: {:?}{}",
            cfg.target,
            sector.peer_tickers(),
            if sector.reduced_peer_count {
                " (reduced)"
            } else {
                ""
            }
        );

        let engine = FeatureEngine::new(cfg.features.clone(), cfg.price_field);
        let features = engine.transform_with(asset, market, &sector.series, hook)?;

        let train = features.window(windows.train);
        let validation = features.window(windows.validation);
        let test = features.window(windows.test);
        for (name, part) in [("train", &train), ("validation", &validation), ("test", &test)] {
            if part.is_empty() {
                return Err(ForecastError::data(format!(
                    "no complete feature rows in the {} window",
                    name
                )));
            }
        }
        info!(
            "Rows: train {}, validation {}, test {}",
            train.len(),
            validation.len(),
            test.len()
        );

        let mut stacker = WalkForwardStacker::new(self.pool.clone(), cfg.stacker.clone())?
            .with_cutoff(windows.cutoff());
        let oof_rows_covered = stacker.generate_oof_with(&validation, hook)?.covered_count();
        stacker.train_meta()?;
        stacker.full_refit_with(&train.concat(&validation)?, hook)?;
        let forecasts = stacker.predict(&test)?;

        let metrics = MetricsCalculator::from_forecasts(&forecasts, &test.targets())?;
        info!("\n{}", metrics.summary());

        let predictions = forecasts
            .iter()
            .map(|f| PredictionRecord::new(&cfg.target, f, &test, &cfg.decision))
            .collect::<ForecastResult<Vec<_>>>()?;

        let (meta_weights, meta_intercept) = stacker
            .meta_weights()
            .ok_or_else(|| ForecastError::state("meta weights unavailable after refit"))?;

        let report = RunReport {
            target: cfg.target.clone(),
            market: cfg.market.clone(),
            windows,
            peers: sector.peers.clone(),
            reduced_peer_count: sector.reduced_peer_count,
            meta_weights,
            meta_intercept,
            oof_rows_covered,
            metrics,
            predictions,
        };

        Ok(PipelineOutput {
            sector,
            features,
            forecasts,
            report,
        })
    }
}
