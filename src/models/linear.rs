//! Elastic net regression on standardized features.
//!
//! Objective (per sample):
//!
//! ```text
//! 1/(2n) * ||y - Xw - b||^2 + alpha * l1_ratio * ||w||_1
//!     + alpha * (1 - l1_ratio) / 2 * ||w||^2
//! ```
//!
//! Columns are z-scored with training statistics before the fit; the same
//! statistics are applied at prediction time.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::{check_predict_input, check_training_data, Forecaster};
use crate::error::{ForecastError, ForecastResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticNetConfig {
    /// Overall penalty strength
    pub alpha: f64,
    /// L1 share of the penalty (0 = ridge, 1 = lasso)
    pub l1_ratio: f64,
    /// Maximum coordinate descent sweeps
    pub max_iter: usize,
    /// Stop once the largest update is below `tol` times the largest coefficient
    pub tol: f64,
}

impl Default for ElasticNetConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            l1_ratio: 0.5,
            max_iter: 1000,
            tol: 1e-4,
        }
    }
}

impl ElasticNetConfig {
    pub fn validate(&self) -> ForecastResult<()> {
        if self.alpha < 0.0 || !(0.0..=1.0).contains(&self.l1_ratio) {
            return Err(ForecastError::config(format!(
                "elastic net needs alpha >= 0 and l1_ratio in [0, 1], got {} / {}",
                self.alpha, self.l1_ratio
            )));
        }
        Ok(())
    }
}

/// Column means and scales learned from the training matrix.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Standardizer {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    pub(crate) fn fit(x: &DMatrix<f64>) -> Self {
        let n = x.nrows() as f64;
        let mut means = Vec::with_capacity(x.ncols());
        let mut scales = Vec::with_capacity(x.ncols());
        for col in x.column_iter() {
            let mean = col.sum() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let sd = var.sqrt();
            means.push(mean);
            // Constant columns pass through centred but unscaled.
            scales.push(if sd > 0.0 { sd } else { 1.0 });
        }
        Self { means, scales }
    }

    pub(crate) fn transform(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| {
            (x[(i, j)] - self.means[j]) / self.scales[j]
        })
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

/// Coordinate descent on centred `x` / `y`.
///
/// With `positive`, every coefficient is clamped at zero after each update.
pub(crate) fn coordinate_descent(
    x: &DMatrix<f64>,
    y: &[f64],
    l1: f64,
    l2: f64,
    positive: bool,
    max_iter: usize,
    tol: f64,
) -> Vec<f64> {
    let n = x.nrows();
    let p = x.ncols();
    let nf = n as f64;

    let col_sq: Vec<f64> = x.column_iter().map(|c| c.norm_squared() / nf).collect();
    let mut w = vec![0.0; p];
    let mut residual: Vec<f64> = y.to_vec();

    for _ in 0..max_iter {
        let mut max_delta: f64 = 0.0;
        let mut max_w: f64 = 0.0;

        for j in 0..p {
            if col_sq[j] == 0.0 {
                continue;
            }
            let col = x.column(j);
            let old = w[j];
            let rho = col
                .iter()
                .zip(&residual)
                .map(|(xij, r)| xij * (r + xij * old))
                .sum::<f64>()
                / nf;

            let mut new = soft_threshold(rho, l1) / (col_sq[j] + l2);
            if positive && new < 0.0 {
                new = 0.0;
            }

            let delta = new - old;
            if delta != 0.0 {
                for (r, xij) in residual.iter_mut().zip(col.iter()) {
                    *r -= xij * delta;
                }
                w[j] = new;
            }
            max_delta = max_delta.max(delta.abs());
            max_w = max_w.max(new.abs());
        }

        if max_w == 0.0 || max_delta <= tol * max_w {
            break;
        }
    }
    w
}

#[derive(Debug, Clone)]
struct FittedLinear {
    standardizer: Standardizer,
    coefficients: Vec<f64>,
    intercept: f64,
}

/// Elastic net with its own standardizer.
#[derive(Debug, Clone)]
pub struct ElasticNet {
    config: ElasticNetConfig,
    fitted: Option<FittedLinear>,
}

impl ElasticNet {
    pub fn new(config: ElasticNetConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    /// Coefficients on the standardized scale.
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.coefficients.as_slice())
    }
}

impl Forecaster for ElasticNet {
    fn name(&self) -> &str {
        "elastic_net"
    }

    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64]) -> ForecastResult<()> {
        check_training_data(self.name(), x, y)?;
        self.config.validate()?;

        let standardizer = Standardizer::fit(x);
        let xs = standardizer.transform(x);
        let y_mean = y.iter().sum::<f64>() / y.len() as f64;
        let yc: Vec<f64> = y.iter().map(|v| v - y_mean).collect();

        let l1 = self.config.alpha * self.config.l1_ratio;
        let l2 = self.config.alpha * (1.0 - self.config.l1_ratio);
        let coefficients =
            coordinate_descent(&xs, &yc, l1, l2, false, self.config.max_iter, self.config.tol);

        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ForecastError::fit(self.name(), "coefficients diverged"));
        }

        self.fitted = Some(FittedLinear {
            standardizer,
            coefficients,
            intercept: y_mean,
        });
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> ForecastResult<Vec<f64>> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| ForecastError::state("elastic_net used before fit"))?;
        check_predict_input(self.name(), x, fitted.coefficients.len())?;

        let xs = fitted.standardizer.transform(x);
        Ok(xs
            .row_iter()
            .map(|row| {
                fitted.intercept
                    + row
                        .iter()
                        .zip(&fitted.coefficients)
                        .map(|(v, w)| v * w)
                        .sum::<f64>()
            })
            .collect())
    }
}
