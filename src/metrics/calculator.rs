//! Forecast accuracy metrics.
//!
//! MAE, RMSE and sign accuracy for each base model, the ensemble, and a
//! naive zero-return baseline.

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};
use crate::walkforward::Forecast;

/// Id of the zero-return baseline row.
pub const NAIVE_MODEL: &str = "naive";
/// Id of the stacked ensemble row.
pub const ENSEMBLE_MODEL: &str = "ensemble";

/// Accuracy of one model over the evaluation rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub model: String,
    pub n: usize,
    pub mae: f64,
    pub rmse: f64,
    /// Share of rows where the predicted and realized signs agree.
    pub sign_accuracy: f64,
}

/// Metrics for every model, naive baseline first and ensemble last.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsTable {
    pub rows: Vec<ForecastMetrics>,
}

impl MetricsTable {
    pub fn get(&self, model: &str) -> Option<&ForecastMetrics> {
        self.rows.iter().find(|m| m.model == model)
    }

    /// Model with the lowest MAE.
    pub fn best_by_mae(&self) -> Option<&ForecastMetrics> {
        self.rows
            .iter()
            .min_by(|a, b| a.mae.partial_cmp(&b.mae).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Generate a summary report.
    pub fn summary(&self) -> String {
        let width = self
            .rows
            .iter()
            .map(|m| m.model.len())
            .max()
            .unwrap_or(5)
            .max(5);
        let mut out = format!(
            "Test Metrics\n\
             ============\n\
             {:<width$}  {:>8}  {:>8}  {:>7}  {:>5}\n",
            "Model",
            "MAE",
            "RMSE",
            "SignAcc",
            "N",
            width = width
        );
        for m in &self.rows {
            out.push_str(&format!(
                "{:<width$}  {:>8.4}  {:>8.4}  {:>7.2}  {:>5}\n",
                m.model,
                m.mae,
                m.rmse,
                m.sign_accuracy,
                m.n,
                width = width
            ));
        }
        out
    }
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Metrics for one prediction vector against realized returns.
    pub fn calculate(model: &str, actual: &[f64], predicted: &[f64]) -> ForecastResult<ForecastMetrics> {
        if actual.len() != predicted.len() {
            return Err(ForecastError::data(format!(
                "{}: {} actual values but {} predictions",
                model,
                actual.len(),
                predicted.len()
            )));
        }
        if actual.is_empty() {
            return Err(ForecastError::data(format!("{}: no rows to evaluate", model)));
        }

        let n = actual.len() as f64;
        let mae = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (a - p).abs())
            .sum::<f64>()
            / n;
        let mse = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (a - p).powi(2))
            .sum::<f64>()
            / n;
        let hits = actual
            .iter()
            .zip(predicted)
            .filter(|(a, p)| sign(**a) == sign(**p))
            .count();

        Ok(ForecastMetrics {
            model: model.to_string(),
            n: actual.len(),
            mae,
            rmse: mse.sqrt(),
            sign_accuracy: hits as f64 / n,
        })
    }

    /// Naive baseline, each base model, then the ensemble.
    pub fn from_forecasts(forecasts: &[Forecast], actual: &[f64]) -> ForecastResult<MetricsTable> {
        let Some(first) = forecasts.first() else {
            return Err(ForecastError::data("no forecasts to evaluate"));
        };

        let mut rows = vec![Self::calculate(
            NAIVE_MODEL,
            actual,
            &vec![0.0; forecasts.len()],
        )?];

        for (j, (id, _)) in first.components.iter().enumerate() {
            let preds: Vec<f64> = forecasts.iter().map(|f| f.components[j].1).collect();
            rows.push(Self::calculate(id, actual, &preds)?);
        }

        let ensemble: Vec<f64> = forecasts.iter().map(|f| f.prediction).collect();
        rows.push(Self::calculate(ENSEMBLE_MODEL, actual, &ensemble)?);

        Ok(MetricsTable { rows })
    }
}

/// -1, 0 or 1.
fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}
