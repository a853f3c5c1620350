//! Core data types for price histories and return series.
//!
//! Price series are immutable once loaded. Every derived quantity is keyed
//! by date so that series with different trading calendars can be aligned
//! explicitly rather than by position.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};

/// Ticker → full price history.
pub type Universe = BTreeMap<String, PriceSeries>;

/// Which price of a bar feeds returns and targets.
///
/// Configured once per run. There is no fallback between fields: asking
/// for `AdjClose` on a bar without an adjusted close is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    AdjClose,
}

impl PriceField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::AdjClose => "adj_close",
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceField {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(' ', "_").as_str() {
            "open" => Ok(Self::Open),
            "high" => Ok(Self::High),
            "low" => Ok(Self::Low),
            "close" => Ok(Self::Close),
            "adj_close" | "adjclose" => Ok(Self::AdjClose),
            other => Err(ForecastError::config(format!(
                "unknown price field '{}'",
                other
            ))),
        }
    }
}

/// Daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Split/dividend adjusted close, when the source provides one.
    pub adj_close: Option<f64>,
    pub volume: f64,
}

impl PriceBar {
    /// Read the configured price field.
    pub fn price(&self, field: PriceField) -> Option<f64> {
        match field {
            PriceField::Open => Some(self.open),
            PriceField::High => Some(self.high),
            PriceField::Low => Some(self.low),
            PriceField::Close => Some(self.close),
            PriceField::AdjClose => self.adj_close,
        }
    }
}

/// Date-ordered price history for one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    ticker: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series, rejecting out-of-order or duplicated dates.
    pub fn new(ticker: impl Into<String>, bars: Vec<PriceBar>) -> ForecastResult<Self> {
        let ticker = ticker.into();
        if let Some(pair) = bars.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(ForecastError::data(format!(
                "{}: dates not strictly increasing at {} -> {}",
                ticker, pair[0].date, pair[1].date
            )));
        }
        Ok(Self { ticker, bars })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Prices for the configured field.
    ///
    /// Fails if any bar lacks the field.
    pub fn prices(&self, field: PriceField) -> ForecastResult<Vec<f64>> {
        self.bars
            .iter()
            .map(|b| {
                b.price(field).ok_or_else(|| {
                    ForecastError::config(format!(
                        "{}: price field '{}' missing on {}",
                        self.ticker, field, b.date
                    ))
                })
            })
            .collect()
    }

    /// Bars with `start <= date <= end`.
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        Self {
            ticker: self.ticker.clone(),
            bars: self
                .bars
                .iter()
                .filter(|b| b.date >= start && b.date <= end)
                .cloned()
                .collect(),
        }
    }

    /// Day-over-day percentage change of `field`; the first date is undefined.
    pub fn returns(&self, field: PriceField) -> ForecastResult<ReturnSeries> {
        let prices = self.prices(field)?;
        Ok(ReturnSeries::new(self.dates(), pct_change(&prices)))
    }
}

/// Date-keyed return values. Undefined entries are NaN.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReturnSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ReturnSeries {
    /// Dates must be ascending and aligned with `values`.
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Self {
        debug_assert_eq!(dates.len(), values.len());
        Self { dates, values }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value on `date`, NaN if the date is absent.
    pub fn get(&self, date: NaiveDate) -> f64 {
        self.dates
            .binary_search(&date)
            .map(|i| self.values[i])
            .unwrap_or(f64::NAN)
    }

    /// Values looked up for each of `dates` (NaN where absent).
    pub fn align(&self, dates: &[NaiveDate]) -> Vec<f64> {
        dates.iter().map(|d| self.get(*d)).collect()
    }

    /// Defined (date, value) pairs.
    pub fn defined(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates
            .iter()
            .zip(self.values.iter())
            .filter(|(_, v)| v.is_finite())
            .map(|(d, v)| (*d, *v))
    }
}

/// Percentage change between consecutive values; element 0 is NaN.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(f64::NAN);
    out.extend(values.windows(2).map(|w| {
        if w[0] != 0.0 && w[0].is_finite() && w[1].is_finite() {
            (w[1] - w[0]) / w[0]
        } else {
            f64::NAN
        }
    }));
    out
}
