//! Causal feature construction.
//!
//! Every feature on the row dated `t` is computed from data dated `t` or
//! earlier. The only forward-looking column is the target itself.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::factor::{decompose, FactorConfig};
use super::rolling::{diff, lag, lead, ln_positive, rolling_mean, rolling_std, rolling_zscore};
use super::table::{FeatureRow, FeatureTable};
use crate::data::{pct_change, PriceField, PriceSeries, ReturnSeries};
use crate::error::{ForecastError, ForecastResult};
use crate::progress::{NoProgress, ProgressHook};

/// Window lengths and factor settings for the feature set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// `r_lag_1..=max_lag`.
    pub max_lag: usize,
    /// Windows for `vol_w`, `rolling_mean_w` and `sma_w_gap`.
    pub windows: Vec<usize>,
    pub hl_window: usize,
    pub volume_z_window: usize,
    pub volume_delta: usize,
    pub factor: FactorConfig,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_lag: 5,
            windows: vec![5, 20, 63],
            hl_window: 20,
            volume_z_window: 21,
            volume_delta: 5,
            factor: FactorConfig::default(),
        }
    }
}

impl FeatureConfig {
    pub fn with_factor(mut self, factor: FactorConfig) -> Self {
        self.factor = factor;
        self
    }

    /// Shortest asset history that can yield a complete row.
    pub fn min_bars(&self) -> usize {
        self.factor.start_index + 2
    }

    pub fn validate(&self) -> ForecastResult<()> {
        if self.windows.iter().any(|w| *w < 2) {
            return Err(ForecastError::config("rolling windows must be at least 2"));
        }
        if self.hl_window < 2 || self.volume_z_window < 2 {
            return Err(ForecastError::config("z-score windows must be at least 2"));
        }
        if self.factor.min_observations < 3 {
            return Err(ForecastError::config(
                "factor regression needs at least 3 observations",
            ));
        }
        Ok(())
    }
}

pub struct FeatureEngine {
    config: FeatureConfig,
    price_field: PriceField,
}

impl FeatureEngine {
    pub fn new(config: FeatureConfig, price_field: PriceField) -> Self {
        Self {
            config,
            price_field,
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn price_field(&self) -> PriceField {
        self.price_field
    }

    /// Column names in table order.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = vec!["r_t".to_string()];
        names.extend((1..=self.config.max_lag).map(|k| format!("r_lag_{}", k)));
        for w in &self.config.windows {
            names.push(format!("vol_{}", w));
            names.push(format!("rolling_mean_{}", w));
            names.push(format!("sma_{}_gap", w));
        }
        names.push(format!("hl_zscore_{}", self.config.hl_window));
        names.push(format!("volu_z_{}", self.config.volume_z_window));
        names.push(format!("volu_delta_{}", self.config.volume_delta));
        for name in ["r_mkt_t", "r_sec_t", "beta_mkt", "beta_sec", "idio_resid_t"] {
            names.push(name.to_string());
        }
        names.extend((1..=6).map(|d| format!("dow_{}", d)));
        names.extend((2..=12).map(|m| format!("month_{}", m)));
        names
    }

    pub fn frame(
        &self,
        asset: &PriceSeries,
        market: &PriceSeries,
        sector: &ReturnSeries,
    ) -> ForecastResult<FeatureTable> {
        self.frame_with(asset, market, sector, &NoProgress)
    }

    /// Full table, one row per asset bar, undefined values kept.
    pub fn frame_with(
        &self,
        asset: &PriceSeries,
        market: &PriceSeries,
        sector: &ReturnSeries,
        hook: &dyn ProgressHook,
    ) -> ForecastResult<FeatureTable> {
        let dates = asset.dates();
        let prices = asset.prices(self.price_field)?;
        let bars = asset.bars();

        let r = pct_change(&prices);
        let target = lead(&r, 1);

        let mut columns: Vec<Vec<f64>> = vec![r.clone()];
        for k in 1..=self.config.max_lag {
            columns.push(lag(&r, k));
        }
        for &w in &self.config.windows {
            columns.push(rolling_std(&r, w));
            columns.push(rolling_mean(&r, w));
            let sma = rolling_mean(&prices, w);
            columns.push(prices.iter().zip(&sma).map(|(p, m)| p / m - 1.0).collect());
        }

        let hl_range: Vec<f64> = bars
            .iter()
            .zip(&prices)
            .map(|(b, p)| (b.high - b.low) / p)
            .collect();
        columns.push(rolling_zscore(&hl_range, self.config.hl_window));

        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let log_vol = ln_positive(&volumes);
        columns.push(rolling_zscore(&log_vol, self.config.volume_z_window));
        columns.push(diff(&log_vol, self.config.volume_delta));

        let r_mkt = market.returns(self.price_field)?.align(&dates);
        let r_sec = sector.align(&dates);

        let factors = decompose(&r, &r_mkt, &r_sec, &self.config.factor, hook)?;
        columns.push(r_mkt);
        columns.push(r_sec);
        columns.push(factors.beta_mkt);
        columns.push(factors.beta_sec);
        columns.push(factors.idio_resid);

        let rows = dates
            .iter()
            .enumerate()
            .map(|(i, date)| {
                let mut values: Vec<f64> = columns.iter().map(|c| c[i]).collect();
                values.extend(calendar_dummies(*date));
                FeatureRow {
                    date: *date,
                    price: prices[i],
                    values,
                    target: target[i],
                }
            })
            .collect();

        let table = FeatureTable::new(self.feature_names(), rows);
        debug!(
            "Framed {} rows x {} features for {}",
            table.len(),
            table.feature_names().len(),
            asset.ticker()
        );
        Ok(table)
    }

    pub fn transform(
        &self,
        asset: &PriceSeries,
        market: &PriceSeries,
        sector: &ReturnSeries,
    ) -> ForecastResult<FeatureTable> {
        self.transform_with(asset, market, sector, &NoProgress)
    }

    /// Complete rows only; rows lost to warm-up or the final target are dropped.
    pub fn transform_with(
        &self,
        asset: &PriceSeries,
        market: &PriceSeries,
        sector: &ReturnSeries,
        hook: &dyn ProgressHook,
    ) -> ForecastResult<FeatureTable> {
        let min_bars = self.config.min_bars();
        if asset.len() < min_bars {
            return Err(ForecastError::data(format!(
                "{} has {} bars; at least {} are needed for the factor warm-up",
                asset.ticker(),
                asset.len(),
                min_bars
            )));
        }

        let framed = self.frame_with(asset, market, sector, hook)?;
        let table = framed.drop_incomplete();
        if table.is_empty() {
            return Err(ForecastError::data(format!(
                "{}: no complete feature rows after warm-up",
                asset.ticker()
            )));
        }

        info!(
            "Built {} complete feature rows for {} ({} dropped)",
            table.len(),
            asset.ticker(),
            framed.len() - table.len()
        );
        Ok(table)
    }
}

/// Fixed one-hot calendar columns: `dow_1..=6` then `month_2..=12`.
fn calendar_dummies(date: NaiveDate) -> impl Iterator<Item = f64> {
    let dow = date.weekday().num_days_from_monday();
    let month = date.month();
    (1..=6u32)
        .map(move |d| if dow == d { 1.0 } else { 0.0 })
        .chain((2..=12u32).map(move |m| if month == m { 1.0 } else { 0.0 }))
}
