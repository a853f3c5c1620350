//! Trading decisions and per-date prediction records.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};
use crate::features::{FeatureRow, FeatureTable};
use crate::metrics::MetricsTable;
use crate::sector::Peer;
use crate::walkforward::{Forecast, SplitWindows};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Buy,
    Hold,
    Sell,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Buy => "Buy",
            Decision::Hold => "Hold",
            Decision::Sell => "Sell",
        };
        write!(f, "{}", s)
    }
}

/// Return thresholds for Buy/Sell. Both are magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    pub buy: f64,
    pub sell: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            buy: 0.005,
            sell: 0.005,
        }
    }
}

impl DecisionThresholds {
    pub fn validate(&self) -> ForecastResult<()> {
        if !(self.buy.is_finite() && self.buy >= 0.0) {
            return Err(ForecastError::config("decision.buy must be a non-negative number"));
        }
        if !(self.sell.is_finite() && self.sell >= 0.0) {
            return Err(ForecastError::config("decision.sell must be a non-negative number"));
        }
        Ok(())
    }

    pub fn decide(&self, predicted_return: f64) -> Decision {
        if predicted_return >= self.buy {
            Decision::Buy
        } else if predicted_return <= -self.sell {
            Decision::Sell
        } else {
            Decision::Hold
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnDrivers {
    pub r_t: f64,
    pub vol20: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDrivers {
    pub r_mkt_t: f64,
    pub beta_mkt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorDrivers {
    pub r_sec_t: f64,
    pub beta_sec: f64,
}

/// Feature values behind a prediction, grouped by source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drivers {
    pub own: OwnDrivers,
    pub market: MarketDrivers,
    pub sector: SectorDrivers,
}

/// One dated next-period forecast, as written to the JSON report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub r_hat_next: f64,
    /// `price * (1 + r_hat_next)`
    pub p_hat_next: f64,
    pub decision: Decision,
    pub drivers: Drivers,
}

impl PredictionRecord {
    pub fn new(
        ticker: &str,
        forecast: &Forecast,
        table: &FeatureTable,
        thresholds: &DecisionThresholds,
    ) -> ForecastResult<Self> {
        let row = table.row(forecast.date).ok_or_else(|| {
            ForecastError::data(format!("no feature row for forecast date {}", forecast.date))
        })?;
        let get = |name: &str| column_value(table, row, name);

        Ok(Self {
            date: forecast.date,
            ticker: ticker.to_string(),
            r_hat_next: forecast.prediction,
            p_hat_next: row.price * (1.0 + forecast.prediction),
            decision: thresholds.decide(forecast.prediction),
            drivers: Drivers {
                own: OwnDrivers {
                    r_t: get("r_t")?,
                    vol20: get("vol_20")?,
                },
                market: MarketDrivers {
                    r_mkt_t: get("r_mkt_t")?,
                    beta_mkt: get("beta_mkt")?,
                },
                sector: SectorDrivers {
                    r_sec_t: get("r_sec_t")?,
                    beta_sec: get("beta_sec")?,
                },
            },
        })
    }
}

fn column_value(table: &FeatureTable, row: &FeatureRow, name: &str) -> ForecastResult<f64> {
    table
        .value(row, name)
        .ok_or_else(|| ForecastError::config(format!("feature column '{}' not present", name)))
}

/// Everything a run produces, serialized as the output document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub target: String,
    pub market: String,
    pub windows: SplitWindows,
    pub peers: Vec<Peer>,
    pub reduced_peer_count: bool,
    /// (model id, weight) pairs of the frozen combiner.
    pub meta_weights: Vec<(String, f64)>,
    pub meta_intercept: f64,
    pub oof_rows_covered: usize,
    pub metrics: MetricsTable,
    pub predictions: Vec<PredictionRecord>,
}

impl RunReport {
    pub fn to_json(&self) -> ForecastResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ForecastError::data(format!("failed to serialize report: {}", e)))
    }

    pub fn decision_counts(&self) -> (usize, usize, usize) {
        self.predictions
            .iter()
            .fold((0, 0, 0), |(b, h, s), p| match p.decision {
                Decision::Buy => (b + 1, h, s),
                Decision::Hold => (b, h + 1, s),
                Decision::Sell => (b, h, s + 1),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_decision_thresholds() {
        let t = DecisionThresholds::default();
        assert_eq!(t.decide(0.005), Decision::Buy);
        assert_eq!(t.decide(0.0049), Decision::Hold);
        assert_eq!(t.decide(-0.0049), Decision::Hold);
        assert_eq!(t.decide(-0.005), Decision::Sell);
        assert_eq!(Decision::Sell.to_string(), "Sell");

        let bad = DecisionThresholds { buy: -0.1, sell: 0.0 };
        assert!(bad.validate().is_err());
    }

    fn table() -> FeatureTable {
        let names: Vec<String> = ["r_t", "vol_20", "r_mkt_t", "r_sec_t", "beta_mkt", "beta_sec"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row = FeatureRow {
            date: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
            price: 200.0,
            values: vec![0.01, 0.02, 0.005, 0.004, 1.1, 0.3],
            target: 0.0,
        };
        FeatureTable::new(names, vec![row])
    }

    #[test]
    fn test_record_from_forecast() {
        let table = table();
        let forecast = Forecast {
            date: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
            prediction: -0.01,
            components: vec![],
        };
        let record =
            PredictionRecord::new("AAA", &forecast, &table, &DecisionThresholds::default()).unwrap();
        assert_relative_eq!(record.p_hat_next, 198.0, epsilon = 1e-9);
        assert_eq!(record.decision, Decision::Sell);
        assert_eq!(record.drivers.market.beta_mkt, 1.1);
        assert_eq!(record.drivers.own.vol20, 0.02);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["decision"], "Sell");
        assert_eq!(json["date"], "2020-01-02");
        assert_eq!(json["drivers"]["sector"]["beta_sec"], 0.3);
    }

    #[test]
    fn test_record_missing_row() {
        let forecast = Forecast {
            date: NaiveDate::from_ymd_opt(2021, 1, 2).unwrap(),
            prediction: 0.0,
            components: vec![],
        };
        assert!(matches!(
            PredictionRecord::new("AAA", &forecast, &table(), &DecisionThresholds::default()),
            Err(ForecastError::DataQuality(_))
        ));
    }
}
