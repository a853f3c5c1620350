//! Expanding-window market/sector factor decomposition.
//!
//! For each row `i` from `start_index` on, the asset return is regressed on
//! `[1, r_mkt, r_sec]` using every valid row up to and including `i`.
//! Row `i`'s residual is computed against the fit that includes row `i`
//! itself, so `idio_resid_t` is an in-sample quantity.

use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ForecastError, ForecastResult};
use crate::progress::ProgressHook;

/// Least-squares strategy for the per-date fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorSolver {
    /// Independent SVD solve per date (minimum-norm on rank deficiency).
    #[default]
    Exact,
    /// Running normal equations. Faster; may differ on ill-conditioned windows.
    Incremental,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorConfig {
    /// First row index that gets a regression.
    pub start_index: usize,
    /// Minimum number of valid rows for a fit.
    pub min_observations: usize,
    pub solver: FactorSolver,
}

impl Default for FactorConfig {
    fn default() -> Self {
        Self {
            start_index: 63,
            min_observations: 30,
            solver: FactorSolver::Exact,
        }
    }
}

impl FactorConfig {
    pub fn with_solver(mut self, solver: FactorSolver) -> Self {
        self.solver = solver;
        self
    }
}

/// Per-row factor outputs, NaN where no fit was possible.
#[derive(Debug, Clone, Default)]
pub struct FactorColumns {
    pub beta_mkt: Vec<f64>,
    pub beta_sec: Vec<f64>,
    pub idio_resid: Vec<f64>,
}

impl FactorColumns {
    fn undefined(n: usize) -> Self {
        Self {
            beta_mkt: vec![f64::NAN; n],
            beta_sec: vec![f64::NAN; n],
            idio_resid: vec![f64::NAN; n],
        }
    }
}

type Fit = Option<Vector3<f64>>;

/// Run the expanding regressions for `r` on `r_mkt` and `r_sec`.
pub fn decompose(
    r: &[f64],
    r_mkt: &[f64],
    r_sec: &[f64],
    config: &FactorConfig,
    hook: &dyn ProgressHook,
) -> ForecastResult<FactorColumns> {
    let n = r.len();
    if r_mkt.len() != n || r_sec.len() != n {
        return Err(ForecastError::data(format!(
            "factor inputs misaligned: {} / {} / {} rows",
            n,
            r_mkt.len(),
            r_sec.len()
        )));
    }

    let valid: Vec<bool> = (0..n)
        .map(|i| r[i].is_finite() && r_mkt[i].is_finite() && r_sec[i].is_finite())
        .collect();

    let fits = match config.solver {
        FactorSolver::Exact => exact_fits(r, r_mkt, r_sec, &valid, config, hook)?,
        FactorSolver::Incremental => {
            warn!("Incremental factor solver selected; results may differ on ill-conditioned windows");
            incremental_fits(r, r_mkt, r_sec, &valid, config, hook)?
        }
    };

    let mut out = FactorColumns::undefined(n);
    for (offset, fit) in fits.into_iter().enumerate() {
        let i = config.start_index + offset;
        if let Some(beta) = fit {
            out.beta_mkt[i] = beta[1];
            out.beta_sec[i] = beta[2];
            if valid[i] {
                out.idio_resid[i] = r[i] - (beta[0] + beta[1] * r_mkt[i] + beta[2] * r_sec[i]);
            }
        }
    }
    Ok(out)
}

fn report(hook: &dyn ProgressHook, progress: &AtomicUsize, total: usize) {
    let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
    hook.on_progress("factor", done, total);
    if done % (total / 10).max(1) == 0 || done == total {
        info!(
            "  Factor regressions: {:.0}% ({}/{})",
            done as f64 / total as f64 * 100.0,
            done,
            total
        );
    }
}

fn exact_fits(
    r: &[f64],
    r_mkt: &[f64],
    r_sec: &[f64],
    valid: &[bool],
    config: &FactorConfig,
    hook: &dyn ProgressHook,
) -> ForecastResult<Vec<Fit>> {
    let n = r.len();
    if config.start_index >= n {
        return Ok(Vec::new());
    }
    let total = n - config.start_index;
    let progress = AtomicUsize::new(0);

    (config.start_index..n)
        .into_par_iter()
        .map(|i| {
            if hook.is_cancelled() {
                return Err(ForecastError::Cancelled(
                    "factor decomposition".to_string(),
                ));
            }
            let rows: Vec<usize> = (0..=i).filter(|&j| valid[j]).collect();
            let fit = if rows.len() >= config.min_observations {
                solve_svd(&rows, r, r_mkt, r_sec)
            } else {
                None
            };
            report(hook, &progress, total);
            Ok(fit)
        })
        .collect()
}

fn solve_svd(rows: &[usize], r: &[f64], r_mkt: &[f64], r_sec: &[f64]) -> Fit {
    let m = rows.len();
    let x = DMatrix::from_fn(m, 3, |row, col| match col {
        0 => 1.0,
        1 => r_mkt[rows[row]],
        _ => r_sec[rows[row]],
    });
    let y = DVector::from_iterator(m, rows.iter().map(|&j| r[j]));

    let svd = x.svd(true, true);
    let max_sv = svd.singular_values.max();
    let eps = max_sv * f64::EPSILON * m.max(3) as f64;
    let beta = svd.solve(&y, eps).ok()?;
    Some(Vector3::new(beta[0], beta[1], beta[2]))
}

fn incremental_fits(
    r: &[f64],
    r_mkt: &[f64],
    r_sec: &[f64],
    valid: &[bool],
    config: &FactorConfig,
    hook: &dyn ProgressHook,
) -> ForecastResult<Vec<Fit>> {
    let n = r.len();
    let total = n.saturating_sub(config.start_index);
    let progress = AtomicUsize::new(0);

    let mut xtx = Matrix3::<f64>::zeros();
    let mut xty = Vector3::<f64>::zeros();
    let mut count = 0usize;
    let mut fits = Vec::with_capacity(total);

    for i in 0..n {
        if valid[i] {
            let x = Vector3::new(1.0, r_mkt[i], r_sec[i]);
            xtx += x * x.transpose();
            xty += x * r[i];
            count += 1;
        }
        if i < config.start_index {
            continue;
        }
        if hook.is_cancelled() {
            return Err(ForecastError::Cancelled("factor decomposition".to_string()));
        }
        let fit = if count >= config.min_observations {
            xtx.try_inverse().map(|inv| inv * xty)
        } else {
            None
        };
        fits.push(fit);
        report(hook, &progress, total);
    }
    Ok(fits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancellationToken, NoProgress};
    use crate::testing::noise;
    use approx::assert_abs_diff_eq;

    fn synthetic(n: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let mkt = noise(n, 0.02, 3);
        let sec = noise(n, 0.02, 5);
        let eps = noise(n, 0.002, 9);
        let r = (0..n)
            .map(|i| 0.5 * mkt[i] + 0.2 * sec[i] + eps[i])
            .collect();
        (r, mkt, sec)
    }

    #[test]
    fn test_beta_converges_to_true_loading() {
        let (r, mkt, sec) = synthetic(300);
        let out = decompose(&r, &mkt, &sec, &FactorConfig::default(), &NoProgress).unwrap();

        assert!(out.beta_mkt[62].is_nan());
        assert!(out.beta_mkt[63].is_finite());
        assert_abs_diff_eq!(out.beta_mkt[299], 0.5, epsilon = 0.05);
        assert_abs_diff_eq!(out.beta_sec[299], 0.2, epsilon = 0.05);
        assert!(out.idio_resid[299].abs() < 0.01);
    }

    #[test]
    fn test_market_beta_error_shrinks_as_window_grows() {
        // r = 0.5 * r_mkt + noise, sector unrelated; the noise stops after
        // row 150 so later rows only dilute the early estimation error.
        let n = 300;
        let mkt = noise(n, 0.02, 41);
        let sec = noise(n, 0.02, 43);
        let eps = noise(n, 0.004, 47);
        let r: Vec<f64> = (0..n)
            .map(|i| 0.5 * mkt[i] + if i <= 150 { eps[i] } else { 0.0 })
            .collect();
        let out = decompose(&r, &mkt, &sec, &FactorConfig::default(), &NoProgress).unwrap();

        let err = |i: usize| (out.beta_mkt[i] - 0.5).abs();
        assert!(err(299) <= err(150));
        for i in 150..n {
            assert!(err(i) < 0.08, "beta_mkt[{}] = {}", i, out.beta_mkt[i]);
            assert!(out.beta_sec[i].abs() < 0.08);
        }
    }

    #[test]
    fn test_too_few_observations_undefined() {
        let (mut r, mkt, sec) = synthetic(90);
        // Only 20 valid rows up to index 70.
        for v in r.iter_mut().take(51) {
            *v = f64::NAN;
        }
        let out = decompose(&r, &mkt, &sec, &FactorConfig::default(), &NoProgress).unwrap();
        assert!(out.beta_mkt[70].is_nan());
        assert!(out.beta_mkt[80].is_finite());
    }

    #[test]
    fn test_residual_undefined_on_invalid_row() {
        let (r, mut mkt, sec) = synthetic(120);
        mkt[100] = f64::NAN;
        let out = decompose(&r, &mkt, &sec, &FactorConfig::default(), &NoProgress).unwrap();
        assert!(out.beta_mkt[100].is_finite());
        assert!(out.idio_resid[100].is_nan());
        assert!(out.idio_resid[101].is_finite());
    }

    #[test]
    fn test_incremental_matches_exact_on_well_conditioned_data() {
        let (r, mkt, sec) = synthetic(150);
        let exact = decompose(&r, &mkt, &sec, &FactorConfig::default(), &NoProgress).unwrap();
        let config = FactorConfig::default().with_solver(FactorSolver::Incremental);
        let incremental = decompose(&r, &mkt, &sec, &config, &NoProgress).unwrap();
        for i in 63..150 {
            assert_abs_diff_eq!(exact.beta_mkt[i], incremental.beta_mkt[i], epsilon = 1e-8);
            assert_abs_diff_eq!(exact.idio_resid[i], incremental.idio_resid[i], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_cancelled() {
        let (r, mkt, sec) = synthetic(100);
        let token = CancellationToken::new();
        token.cancel();
        let err = decompose(&r, &mkt, &sec, &FactorConfig::default(), &token).unwrap_err();
        assert!(matches!(err, ForecastError::Cancelled(_)));
    }
}
