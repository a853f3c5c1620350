//! CSV loader for daily OHLCV price files.
//!
//! One file per ticker, `<data_dir>/<TICKER>.csv`, with the header:
//! - Date, Open, High, Low, Close, Adj Close, Volume
//!
//! `Adj Close` is optional. Dates are `%Y-%m-%d`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::types::{PriceBar, PriceSeries, Universe};

/// Columns every price file must carry.
pub const REQUIRED_COLUMNS: &[&str] = &["Date", "Open", "High", "Low", "Close", "Volume"];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Adj Close", default)]
    adj_close: Option<f64>,
    #[serde(rename = "Volume")]
    volume: f64,
}

/// Price file loader.
pub struct DataLoader {
    data_dir: PathBuf,
}

impl DataLoader {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", ticker))
    }

    /// List tickers with a CSV file in the data directory.
    pub fn available_tickers(&self) -> Result<Vec<String>, LoaderError> {
        if !self.data_dir.exists() {
            return Ok(vec![]);
        }

        let mut tickers = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if let Some(ticker) = name.strip_suffix(".csv") {
                tickers.push(ticker.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }

    /// Load one ticker's full history, sorted by date.
    pub fn load_ticker(&self, ticker: &str) -> Result<PriceSeries, LoaderError> {
        let path = self.csv_path(ticker);
        if !path.exists() {
            return Err(LoaderError::FileNotFound(path.display().to_string()));
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&path)?;

        let headers = reader.headers()?.clone();
        let missing: Vec<_> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| !headers.iter().any(|h| h == **c))
            .collect();
        if !missing.is_empty() {
            return Err(LoaderError::InvalidData(format!(
                "{}: missing columns {:?}",
                path.display(),
                missing
            )));
        }

        let mut bars = Vec::new();
        for row in reader.deserialize() {
            let row: CsvRow = row?;
            let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").map_err(|e| {
                LoaderError::InvalidData(format!("{}: bad date '{}': {}", ticker, row.date, e))
            })?;
            bars.push(PriceBar {
                date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                adj_close: row.adj_close,
                volume: row.volume,
            });
        }

        bars.sort_by_key(|b| b.date);
        debug!("Loaded {} bars for {}", bars.len(), ticker);

        PriceSeries::new(ticker, bars).map_err(|e| LoaderError::InvalidData(e.to_string()))
    }

    /// Load several tickers into a universe.
    pub fn load_universe<S: AsRef<str>>(&self, tickers: &[S]) -> Result<Universe, LoaderError> {
        let mut universe = Universe::new();
        for ticker in tickers {
            let ticker = ticker.as_ref();
            universe.insert(ticker.to_string(), self.load_ticker(ticker)?);
        }
        Ok(universe)
    }

    /// Load every CSV in the data directory.
    pub fn load_all(&self) -> Result<Universe, LoaderError> {
        let tickers = self.available_tickers()?;
        self.load_universe(&tickers)
    }
}
