//! Date-indexed feature table shared by the engine and the stacker.

use chrono::NaiveDate;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};
use crate::walkforward::DateWindow;

/// One date's features and its next-period target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    /// Configured price on `date`.
    pub price: f64,
    /// Values in `FeatureTable::feature_names` order.
    pub values: Vec<f64>,
    /// Return from `date` to the next bar.
    pub target: f64,
}

impl FeatureRow {
    pub fn is_complete(&self) -> bool {
        self.target.is_finite() && self.values.iter().all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureTable {
    feature_names: Vec<String>,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(feature_names: Vec<String>, rows: Vec<FeatureRow>) -> Self {
        Self {
            feature_names,
            rows,
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    pub fn row(&self, date: NaiveDate) -> Option<&FeatureRow> {
        self.rows
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Named feature of a row, if both exist.
    pub fn value(&self, row: &FeatureRow, name: &str) -> Option<f64> {
        self.column_index(name).map(|i| row.values[i])
    }

    /// Rows whose features and target are all defined.
    pub fn drop_incomplete(&self) -> FeatureTable {
        Self {
            feature_names: self.feature_names.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| r.is_complete())
                .cloned()
                .collect(),
        }
    }

    /// Rows dated inside `window`.
    pub fn window(&self, window: DateWindow) -> FeatureTable {
        Self {
            feature_names: self.feature_names.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| window.contains(r.date))
                .cloned()
                .collect(),
        }
    }

    /// Append `later`, which must share columns and start after this table ends.
    pub fn concat(&self, later: &FeatureTable) -> ForecastResult<FeatureTable> {
        if self.feature_names != later.feature_names {
            return Err(ForecastError::config(
                "cannot concatenate feature tables with different columns",
            ));
        }
        if let (Some(last), Some(first)) = (self.rows.last(), later.rows.first()) {
            if first.date <= last.date {
                return Err(ForecastError::data(format!(
                    "feature tables overlap: {} <= {}",
                    first.date, last.date
                )));
            }
        }
        let mut rows = self.rows.clone();
        rows.extend(later.rows.iter().cloned());
        Ok(Self {
            feature_names: self.feature_names.clone(),
            rows,
        })
    }

    /// Row-major design matrix (rows x features).
    pub fn design_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.rows.len(), self.feature_names.len(), |i, j| {
            self.rows[i].values[j]
        })
    }

    pub fn targets(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.target).collect()
    }
}
