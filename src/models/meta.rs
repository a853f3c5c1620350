//! Non-negative lasso used to combine base-model forecasts.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::linear::coordinate_descent;
use super::{check_predict_input, check_training_data, Forecaster};
use crate::error::{ForecastError, ForecastResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonNegativeLinearConfig {
    /// L1 penalty.
    pub alpha: f64,
    /// Center inputs and learn an unconstrained intercept
    pub fit_intercept: bool,
    /// Maximum coordinate descent sweeps
    pub max_iter: usize,
    /// Stop once the largest update is below `tol` times the largest coefficient
    pub tol: f64,
}

impl Default for NonNegativeLinearConfig {
    fn default() -> Self {
        Self {
            alpha: 1e-4,
            fit_intercept: true,
            max_iter: 10_000,
            tol: 1e-6,
        }
    }
}

/// Lasso with every coefficient constrained to be >= 0.
#[derive(Debug, Clone)]
pub struct NonNegativeLinear {
    config: NonNegativeLinearConfig,
    coefficients: Option<Vec<f64>>,
    intercept: f64,
}

impl NonNegativeLinear {
    pub fn new(config: NonNegativeLinearConfig) -> Self {
        Self {
            config,
            coefficients: None,
            intercept: 0.0,
        }
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coefficients.as_deref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Forecaster for NonNegativeLinear {
    fn name(&self) -> &str {
        "meta"
    }

    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64]) -> ForecastResult<()> {
        check_training_data(self.name(), x, y)?;
        if self.config.alpha < 0.0 {
            return Err(ForecastError::config("meta alpha must be non-negative"));
        }

        let n = x.nrows() as f64;
        let (xc, yc, x_means, y_mean) = if self.config.fit_intercept {
            let x_means: Vec<f64> = x.column_iter().map(|c| c.sum() / n).collect();
            let y_mean = y.iter().sum::<f64>() / n;
            let xc = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] - x_means[j]);
            let yc: Vec<f64> = y.iter().map(|v| v - y_mean).collect();
            (xc, yc, x_means, y_mean)
        } else {
            (x.clone(), y.to_vec(), vec![0.0; x.ncols()], 0.0)
        };

        let w = coordinate_descent(
            &xc,
            &yc,
            self.config.alpha,
            0.0,
            true,
            self.config.max_iter,
            self.config.tol,
        );
        if w.iter().any(|c| !c.is_finite()) {
            return Err(ForecastError::fit(self.name(), "coefficients diverged"));
        }

        self.intercept = y_mean - w.iter().zip(&x_means).map(|(c, m)| c * m).sum::<f64>();
        self.coefficients = Some(w);
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> ForecastResult<Vec<f64>> {
        let w = self
            .coefficients
            .as_ref()
            .ok_or_else(|| ForecastError::state("meta learner used before fit"))?;
        check_predict_input(self.name(), x, w.len())?;
        Ok(x.row_iter()
            .map(|row| self.intercept + row.iter().zip(w).map(|(v, c)| v * c).sum::<f64>())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_recovers_positive_blend() {
        let n = 100;
        let x = DMatrix::from_fn(n, 2, |i, j| {
            let t = i as f64;
            if j == 0 {
                (t * 0.3).sin() * 0.01
            } else {
                (t * 0.7).cos() * 0.01
            }
        });
        let y: Vec<f64> = (0..n).map(|i| 0.6 * x[(i, 0)] + 0.4 * x[(i, 1)] + 0.001).collect();

        let mut meta = NonNegativeLinear::new(NonNegativeLinearConfig {
            alpha: 0.0,
            ..Default::default()
        });
        meta.fit(&x, &y).unwrap();
        let w = meta.coefficients().unwrap();
        assert_abs_diff_eq!(w[0], 0.6, epsilon = 1e-4);
        assert_abs_diff_eq!(w[1], 0.4, epsilon = 1e-4);
        assert_abs_diff_eq!(meta.intercept(), 0.001, epsilon = 1e-5);
    }

    #[test]
    fn test_negatively_related_input_gets_zero_weight() {
        let n = 60;
        let signal: Vec<f64> = (0..n).map(|i| ((i as f64) * 0.5).sin() * 0.2).collect();
        let x = DMatrix::from_fn(n, 2, |i, j| if j == 0 { signal[i] } else { -signal[i] });

        let mut meta = NonNegativeLinear::new(NonNegativeLinearConfig::default());
        meta.fit(&x, &signal).unwrap();
        let w = meta.coefficients().unwrap();
        assert!(w.iter().all(|c| *c >= 0.0));
        assert_eq!(w[1], 0.0);
        assert!(w[0] > 0.9);
    }

    #[test]
    fn test_unfitted_predict_is_state_error() {
        let meta = NonNegativeLinear::new(NonNegativeLinearConfig::default());
        let x = DMatrix::zeros(2, 2);
        assert!(matches!(meta.predict(&x), Err(ForecastError::State(_))));
    }
}
