//! Train / validation / test date windows.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Fails with a configuration error if the window is inverted.
    pub fn validate(&self, name: &str) -> ForecastResult<()> {
        if self.start > self.end {
            return Err(ForecastError::config(format!(
                "{} window is inverted: {}",
                name, self
            )));
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// The three chronological partitions of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitWindows {
    pub train: DateWindow,
    pub validation: DateWindow,
    pub test: DateWindow,
}

impl SplitWindows {
    pub fn new(train: DateWindow, validation: DateWindow, test: DateWindow) -> Self {
        Self {
            train,
            validation,
            test,
        }
    }

    /// Each window must be well formed and strictly precede the next.
    pub fn validate(&self) -> ForecastResult<()> {
        self.train.validate("train")?;
        self.validation.validate("validation")?;
        self.test.validate("test")?;

        if self.train.end >= self.validation.start {
            return Err(ForecastError::config(format!(
                "train window ({}) overlaps validation window ({})",
                self.train, self.validation
            )));
        }
        if self.validation.end >= self.test.start {
            return Err(ForecastError::config(format!(
                "validation window ({}) overlaps test window ({})",
                self.validation, self.test
            )));
        }
        Ok(())
    }

    /// First date that must never reach a training set.
    pub fn cutoff(&self) -> NaiveDate {
        self.test.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn splits() -> SplitWindows {
        SplitWindows::new(
            DateWindow::new(d(2018, 1, 1), d(2021, 12, 31)),
            DateWindow::new(d(2022, 1, 1), d(2023, 6, 30)),
            DateWindow::new(d(2023, 7, 1), d(2024, 12, 31)),
        )
    }

    #[test]
    fn test_window_contains_bounds() {
        let w = DateWindow::new(d(2020, 1, 1), d(2020, 1, 31));
        assert!(w.contains(d(2020, 1, 1)));
        assert!(w.contains(d(2020, 1, 31)));
        assert!(!w.contains(d(2020, 2, 1)));
        assert_eq!(w.to_string(), "2020-01-01 to 2020-01-31");
    }

    #[test]
    fn test_inverted_window_rejected() {
        let w = DateWindow::new(d(2020, 2, 1), d(2020, 1, 1));
        assert!(matches!(
            w.validate("training"),
            Err(ForecastError::Configuration(_))
        ));
    }

    #[test]
    fn test_split_ordering() {
        let s = splits();
        assert!(s.validate().is_ok());
        assert_eq!(s.cutoff(), d(2023, 7, 1));

        let mut overlapping = s;
        overlapping.validation.start = d(2021, 12, 31);
        assert!(overlapping.validate().is_err());

        let mut overlapping = s;
        overlapping.test.start = d(2023, 6, 30);
        assert!(overlapping.validate().is_err());
    }
}
