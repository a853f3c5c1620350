//! Synthetic series shared by unit tests.

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use nalgebra::DMatrix;

use crate::data::{PriceBar, PriceSeries};
use crate::error::{ForecastError, ForecastResult};
use crate::features::{FeatureRow, FeatureTable};
use crate::models::{ElasticNet, ElasticNetConfig, Forecaster};

pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 1, 1).unwrap()
}

/// `n` seeded uniform draws in `[-scale, scale]`.
pub fn noise(n: usize, scale: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-scale..=scale)).collect()
}

/// Consecutive calendar days starting at `start_date()`.
pub fn daily_dates(n: usize) -> Vec<NaiveDate> {
    (0..n).map(|i| start_date() + Duration::days(i as i64)).collect()
}

/// Price series whose percentage changes reproduce `returns`.
///
/// The series has `returns.len() + 1` bars; high/low straddle the close
/// and volume varies so every feature column is defined.
pub fn series_from_returns(ticker: &str, returns: &[f64], seed: u64) -> PriceSeries {
    let n = returns.len() + 1;
    let spread = noise(n, 1.0, seed ^ 0xA5A5);
    let volume = noise(n, 1.0, seed ^ 0x5A5A);
    let dates = daily_dates(n);

    let mut price = 100.0;
    let bars = (0..n)
        .map(|i| {
            if i > 0 {
                price *= 1.0 + returns[i - 1];
            }
            let width = price * (0.01 + 0.005 * spread[i].abs());
            PriceBar {
                date: dates[i],
                open: price,
                high: price + width,
                low: price - width,
                close: price,
                adj_close: Some(price),
                volume: 1_000_000.0 * (1.0 + 0.5 * volume[i]),
            }
        })
        .collect();

    PriceSeries::new(ticker, bars).unwrap()
}

/// Two-feature table whose target is `0.5 * f0` plus noise.
pub fn synthetic_table(n: usize, seed: u64) -> FeatureTable {
    let f0 = noise(n, 1.0, seed);
    let f1 = noise(n, 1.0, seed + 100);
    let eps = noise(n, 0.1, seed + 200);
    let rows = daily_dates(n)
        .into_iter()
        .enumerate()
        .map(|(i, date)| FeatureRow {
            date,
            price: 100.0,
            values: vec![f0[i], f1[i]],
            target: 0.5 * f0[i] + eps[i],
        })
        .collect();
    FeatureTable::new(vec!["f0".into(), "f1".into()], rows)
}

/// Always predicts exactly 0.0.
#[derive(Debug, Default)]
pub struct ZeroModel {
    fitted: bool,
}

impl Forecaster for ZeroModel {
    fn name(&self) -> &str {
        "zero"
    }

    fn fit(&mut self, _x: &DMatrix<f64>, _y: &[f64]) -> ForecastResult<()> {
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> ForecastResult<Vec<f64>> {
        if !self.fitted {
            return Err(ForecastError::state("zero model used before fit"));
        }
        Ok(vec![0.0; x.nrows()])
    }
}

/// Elastic net whose predictions are sign-flipped.
#[derive(Debug)]
pub struct NegatingModel {
    inner: ElasticNet,
}

impl Default for NegatingModel {
    fn default() -> Self {
        Self {
            inner: ElasticNet::new(ElasticNetConfig {
                alpha: 1e-4,
                ..Default::default()
            }),
        }
    }
}

impl Forecaster for NegatingModel {
    fn name(&self) -> &str {
        "negated"
    }

    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64]) -> ForecastResult<()> {
        self.inner.fit(x, y)
    }

    fn predict(&self, x: &DMatrix<f64>) -> ForecastResult<Vec<f64>> {
        Ok(self.inner.predict(x)?.into_iter().map(|v| -v).collect())
    }
}

/// Fails every fit.
#[derive(Debug)]
pub struct FailingModel;

impl Forecaster for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    fn fit(&mut self, _x: &DMatrix<f64>, _y: &[f64]) -> ForecastResult<()> {
        Err(ForecastError::fit(self.name(), "singular design"))
    }

    fn predict(&self, _x: &DMatrix<f64>) -> ForecastResult<Vec<f64>> {
        Err(ForecastError::state("failing model never fits"))
    }
}

/// Predicts NaN for every row.
#[derive(Debug, Default)]
pub struct NanModel;

impl Forecaster for NanModel {
    fn name(&self) -> &str {
        "nan"
    }

    fn fit(&mut self, _x: &DMatrix<f64>, _y: &[f64]) -> ForecastResult<()> {
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> ForecastResult<Vec<f64>> {
        Ok(vec![f64::NAN; x.nrows()])
    }
}

/// Fits only on at most `max_rows` rows, so larger refits fail.
#[derive(Debug)]
pub struct RowLimitedModel {
    max_rows: usize,
    fitted: bool,
}

impl RowLimitedModel {
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows,
            fitted: false,
        }
    }
}

impl Forecaster for RowLimitedModel {
    fn name(&self) -> &str {
        "row_limited"
    }

    fn fit(&mut self, x: &DMatrix<f64>, _y: &[f64]) -> ForecastResult<()> {
        if x.nrows() > self.max_rows {
            return Err(ForecastError::fit(self.name(), "singular"));
        }
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> ForecastResult<Vec<f64>> {
        if !self.fitted {
            return Err(ForecastError::state("row-limited model used before fit"));
        }
        Ok(vec![0.0; x.nrows()])
    }
}
