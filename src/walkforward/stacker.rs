//! Walk-forward stacking ensemble.
//!
//! Phases run strictly in order:
//!
//! 1. `generate_oof`: expanding folds over the validation rows, each base
//!    model trained fresh per fold, producing the out-of-fold matrix.
//! 2. `train_meta`: non-negative combiner fit on the covered OOF rows.
//! 3. `full_refit`: fresh base models trained on train + validation rows.
//! 4. `predict`: frozen base models feed the frozen combiner.
//!
//! A base or meta fit failure moves the stacker to `Failed`; every later
//! call returns a state error.

use std::fmt;
use std::ops::Range;

use chrono::NaiveDate;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::folds::time_series_folds;
use super::oof::OofMatrix;
use crate::error::{ForecastError, ForecastResult};
use crate::features::FeatureTable;
use crate::models::{Forecaster, MetaSpec, ModelPool, NonNegativeLinear};
use crate::progress::{NoProgress, ProgressHook};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackerConfig {
    /// Number of OOF folds.
    pub n_splits: usize,
    pub meta: MetaSpec,
}

impl Default for StackerConfig {
    fn default() -> Self {
        Self {
            n_splits: 5,
            meta: MetaSpec::default(),
        }
    }
}

/// Observable phase of a stacker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackerState {
    Init,
    OofGenerated,
    MetaTrained,
    Frozen,
    Failed,
}

impl fmt::Display for StackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::OofGenerated => "oof_generated",
            Self::MetaTrained => "meta_trained",
            Self::Frozen => "frozen",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

type FittedModels = Vec<(String, Box<dyn Forecaster>)>;

enum Phase {
    Init,
    OofGenerated {
        oof: OofMatrix,
    },
    MetaTrained {
        oof: OofMatrix,
        meta: NonNegativeLinear,
    },
    Frozen {
        oof: OofMatrix,
        meta: NonNegativeLinear,
        models: FittedModels,
    },
    Failed {
        reason: String,
    },
}

impl Phase {
    fn state(&self) -> StackerState {
        match self {
            Self::Init => StackerState::Init,
            Self::OofGenerated { .. } => StackerState::OofGenerated,
            Self::MetaTrained { .. } => StackerState::MetaTrained,
            Self::Frozen { .. } => StackerState::Frozen,
            Self::Failed { .. } => StackerState::Failed,
        }
    }
}

/// One ensemble prediction with the base predictions behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub date: NaiveDate,
    pub prediction: f64,
    /// (model id, base prediction) in pool order.
    pub components: Vec<(String, f64)>,
}

pub struct WalkForwardStacker {
    pool: ModelPool,
    config: StackerConfig,
    cutoff: Option<NaiveDate>,
    feature_names: Option<Vec<String>>,
    phase: Phase,
}

impl WalkForwardStacker {
    pub fn new(pool: ModelPool, config: StackerConfig) -> ForecastResult<Self> {
        if pool.is_empty() {
            return Err(ForecastError::config("model pool is empty"));
        }
        if config.n_splits == 0 {
            return Err(ForecastError::config("n_splits must be positive"));
        }
        Ok(Self {
            pool,
            config,
            cutoff: None,
            feature_names: None,
            phase: Phase::Init,
        })
    }

    /// Reject refit rows dated on or after `cutoff` (the test start).
    pub fn with_cutoff(mut self, cutoff: NaiveDate) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    pub fn state(&self) -> StackerState {
        self.phase.state()
    }

    pub fn model_ids(&self) -> Vec<&str> {
        self.pool.ids()
    }

    pub fn oof(&self) -> Option<&OofMatrix> {
        match &self.phase {
            Phase::OofGenerated { oof }
            | Phase::MetaTrained { oof, .. }
            | Phase::Frozen { oof, .. } => Some(oof),
            _ => None,
        }
    }

    /// Frozen (model id, weight) pairs and the intercept, once trained.
    pub fn meta_weights(&self) -> Option<(Vec<(String, f64)>, f64)> {
        let meta = match &self.phase {
            Phase::MetaTrained { meta, .. } | Phase::Frozen { meta, .. } => meta,
            _ => return None,
        };
        let weights = self
            .pool
            .ids()
            .into_iter()
            .map(String::from)
            .zip(meta.coefficients()?.iter().copied())
            .collect();
        Some((weights, meta.intercept()))
    }

    fn expect_state(&self, expected: StackerState, operation: &str) -> ForecastResult<()> {
        if let Phase::Failed { reason } = &self.phase {
            return Err(ForecastError::state(format!(
                "{} called on a failed stacker ({})",
                operation, reason
            )));
        }
        let actual = self.state();
        if actual != expected {
            return Err(ForecastError::state(format!(
                "{} requires state {}, stacker is {}",
                operation, expected, actual
            )));
        }
        Ok(())
    }

    fn check_columns(&self, table: &FeatureTable) -> ForecastResult<()> {
        match &self.feature_names {
            Some(names) if names.as_slice() != table.feature_names() => Err(
                ForecastError::config("feature columns differ from those used for the OOF phase"),
            ),
            _ => Ok(()),
        }
    }

    /// Record a fit failure and hand the error back.
    fn fail(&mut self, err: ForecastError) -> ForecastError {
        if let ForecastError::ModelFit { .. } = err {
            warn!("Stacker failed: {}", err);
            self.phase = Phase::Failed {
                reason: err.to_string(),
            };
        }
        err
    }

    pub fn generate_oof(&mut self, validation: &FeatureTable) -> ForecastResult<&OofMatrix> {
        self.generate_oof_with(validation, &NoProgress)
    }

    /// Out-of-fold predictions over the validation rows only.
    pub fn generate_oof_with(
        &mut self,
        validation: &FeatureTable,
        hook: &dyn ProgressHook,
    ) -> ForecastResult<&OofMatrix> {
        self.expect_state(StackerState::Init, "generate_oof")?;
        let folds = time_series_folds(validation.len(), self.config.n_splits)?;

        let x = validation.design_matrix();
        let y = validation.targets();
        let ids: Vec<String> = self.pool.ids().into_iter().map(String::from).collect();
        let mut oof = OofMatrix::new(validation.dates(), ids, y.clone());

        info!(
            "Generating OOF predictions: {} validation rows, {} folds, {} models",
            validation.len(),
            folds.len(),
            self.pool.len()
        );

        for (i, fold) in folds.iter().enumerate() {
            if hook.is_cancelled() {
                return Err(ForecastError::Cancelled("OOF generation".to_string()));
            }
            let x_train = row_block(&x, fold.train.clone());
            let y_train = &y[fold.train.clone()];
            let x_test = row_block(&x, fold.test.clone());

            let predictions = match fit_and_predict(&self.pool, &x_train, y_train, &x_test) {
                Ok(p) => p,
                Err(e) => return Err(self.fail(e)),
            };
            oof.fill(fold.test.start, &predictions);

            hook.on_progress("oof", i + 1, folds.len());
            info!(
                "  Fold {}/{}: trained on {} rows, predicted {}",
                i + 1,
                folds.len(),
                fold.train.len(),
                fold.test.len()
            );
        }

        debug!(
            "OOF coverage: {}/{} rows",
            oof.covered_count(),
            oof.len()
        );
        self.feature_names = Some(validation.feature_names().to_vec());
        self.phase = Phase::OofGenerated { oof };
        match &self.phase {
            Phase::OofGenerated { oof } => Ok(oof),
            _ => Err(ForecastError::state("OOF matrix missing after generation")),
        }
    }

    /// Fit the non-negative combiner on covered OOF rows.
    pub fn train_meta(&mut self) -> ForecastResult<&NonNegativeLinear> {
        self.expect_state(StackerState::OofGenerated, "train_meta")?;
        let Phase::OofGenerated { oof } = std::mem::replace(&mut self.phase, Phase::Init) else {
            return Err(ForecastError::state("train_meta: phase changed unexpectedly"));
        };

        let (z, y) = oof.covered_rows();
        let mut meta = self.config.meta.build();
        if let Err(e) = meta.fit(&z, &y) {
            let e = match e {
                e @ ForecastError::ModelFit { .. } => e,
                other => ForecastError::fit("meta", other.to_string()),
            };
            return Err(self.fail(e));
        }

        info!(
            "Meta learner trained on {} covered rows: weights {:?}, intercept {:.6}",
            z.nrows(),
            meta.coefficients().unwrap_or_default(),
            meta.intercept()
        );
        self.phase = Phase::MetaTrained { oof, meta };
        match &self.phase {
            Phase::MetaTrained { meta, .. } => Ok(meta),
            _ => Err(ForecastError::state("meta learner missing after training")),
        }
    }

    pub fn full_refit(&mut self, fit_rows: &FeatureTable) -> ForecastResult<()> {
        self.full_refit_with(fit_rows, &NoProgress)
    }

    /// Train fresh base models on train + validation rows.
    pub fn full_refit_with(
        &mut self,
        fit_rows: &FeatureTable,
        hook: &dyn ProgressHook,
    ) -> ForecastResult<()> {
        self.expect_state(StackerState::MetaTrained, "full_refit")?;
        self.check_columns(fit_rows)?;
        if fit_rows.is_empty() {
            return Err(ForecastError::data("full refit needs at least one row"));
        }
        if let Some(cutoff) = self.cutoff {
            if let Some(row) = fit_rows.rows().iter().find(|r| r.date >= cutoff) {
                return Err(ForecastError::config(format!(
                    "refit row dated {} is on or after the test cutoff {}",
                    row.date, cutoff
                )));
            }
        }
        if hook.is_cancelled() {
            return Err(ForecastError::Cancelled("full refit".to_string()));
        }

        let x = fit_rows.design_matrix();
        let y = fit_rows.targets();
        let models = match fit_all(&self.pool, &x, &y) {
            Ok(m) => m,
            Err(e) => return Err(self.fail(e)),
        };
        hook.on_progress("refit", 1, 1);

        let Phase::MetaTrained { oof, meta } = std::mem::replace(&mut self.phase, Phase::Init)
        else {
            return Err(ForecastError::state("full_refit: phase changed unexpectedly"));
        };
        info!("Refit {} base models on {} rows", models.len(), fit_rows.len());
        self.phase = Phase::Frozen { oof, meta, models };
        Ok(())
    }

    /// Ensemble forecasts for every row of `table`. No retraining.
    pub fn predict(&self, table: &FeatureTable) -> ForecastResult<Vec<Forecast>> {
        self.expect_state(StackerState::Frozen, "predict")?;
        self.check_columns(table)?;
        let Phase::Frozen { meta, models, .. } = &self.phase else {
            return Err(ForecastError::state("predict requires a frozen stacker"));
        };
        if table.is_empty() {
            return Ok(Vec::new());
        }

        let x = table.design_matrix();
        let base: Vec<Vec<f64>> = models
            .iter()
            .map(|(_, model)| model.predict(&x))
            .collect::<ForecastResult<_>>()?;

        let z = DMatrix::from_fn(x.nrows(), base.len(), |i, j| base[j][i]);
        let ensemble = meta.predict(&z)?;

        Ok(table
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| Forecast {
                date: row.date,
                prediction: ensemble[i],
                components: models
                    .iter()
                    .zip(&base)
                    .map(|((id, _), preds)| (id.clone(), preds[i]))
                    .collect(),
            })
            .collect())
    }
}

fn row_block(x: &DMatrix<f64>, rows: Range<usize>) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), x.ncols(), |i, j| x[(rows.start + i, j)])
}

/// Fit fresh instances of every pool model in parallel.
///
/// Errors are reported for the first failing model in pool order.
fn fit_all(pool: &ModelPool, x: &DMatrix<f64>, y: &[f64]) -> ForecastResult<FittedModels> {
    let results: Vec<ForecastResult<(String, Box<dyn Forecaster>)>> = pool
        .build_all()
        .into_par_iter()
        .map(|(id, mut model)| -> ForecastResult<(String, Box<dyn Forecaster>)> {
            model.fit(x, y).map_err(|e| as_fit_error(&id, e))?;
            Ok((id, model))
        })
        .collect();
    results.into_iter().collect()
}

fn fit_and_predict(
    pool: &ModelPool,
    x_train: &DMatrix<f64>,
    y_train: &[f64],
    x_test: &DMatrix<f64>,
) -> ForecastResult<Vec<Vec<f64>>> {
    fit_all(pool, x_train, y_train)?
        .iter()
        .map(|(id, model)| model.predict(x_test).map_err(|e| as_fit_error(id, e)))
        .collect()
}

fn as_fit_error(id: &str, err: ForecastError) -> ForecastError {
    match err {
        ForecastError::ModelFit { reason, .. } => ForecastError::fit(id, reason),
        ForecastError::Cancelled(m) => ForecastError::Cancelled(m),
        other => ForecastError::fit(id, other.to_string()),
    }
}
