//! Data integrity validation for daily price histories.
//!
//! Validates:
//! - Date continuity (no gaps longer than a week)
//! - Price validity (configured field present, finite and positive)
//! - Bar consistency (high >= low)
//! - Volume validity (finite, non-negative)

use crate::data::{PriceField, PriceSeries, Universe};

/// Result of a single validation check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn fail(name: &str, message: &str, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.to_string(),
            details,
        }
    }
}

/// Integrity report for one ticker.
#[derive(Debug, Clone)]
pub struct DataIntegrityReport {
    pub ticker: String,
    pub bar_count: usize,
    pub checks: Vec<CheckResult>,
}

impl DataIntegrityReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn summary(&self) -> String {
        let passed = self.checks.iter().filter(|c| c.passed).count();
        format!(
            "{} ({} bars): {}/{} checks passed",
            self.ticker,
            self.bar_count,
            passed,
            self.checks.len()
        )
    }
}

/// Largest calendar gap between consecutive bars before it is flagged.
const MAX_GAP_DAYS: i64 = 7;

/// Example offending dates listed in a failed check.
const MAX_DETAILS: usize = 5;

pub struct DataIntegrityValidator {
    price_field: PriceField,
}

impl DataIntegrityValidator {
    pub fn new(price_field: PriceField) -> Self {
        Self { price_field }
    }

    /// Run all checks on one series.
    pub fn validate(&self, series: &PriceSeries) -> DataIntegrityReport {
        let checks = vec![
            self.check_date_continuity(series),
            self.check_price_validity(series),
            self.check_high_low(series),
            self.check_volume(series),
        ];
        DataIntegrityReport {
            ticker: series.ticker().to_string(),
            bar_count: series.len(),
            checks,
        }
    }

    /// Reports for every ticker, in ticker order.
    pub fn validate_universe(&self, universe: &Universe) -> Vec<DataIntegrityReport> {
        universe.values().map(|s| self.validate(s)).collect()
    }

    fn check_date_continuity(&self, series: &PriceSeries) -> CheckResult {
        if series.is_empty() {
            return CheckResult::fail("date_continuity", "No bars found", None);
        }

        let gaps: Vec<String> = series
            .bars()
            .windows(2)
            .filter_map(|w| {
                let days = (w[1].date - w[0].date).num_days();
                (days > MAX_GAP_DAYS).then(|| format!("{} to {} ({} days)", w[0].date, w[1].date, days))
            })
            .collect();

        if gaps.is_empty() {
            CheckResult::pass(
                "date_continuity",
                &format!("{} bars, no major gaps", series.len()),
            )
        } else {
            CheckResult::fail(
                "date_continuity",
                &format!("{} major gaps found", gaps.len()),
                Some(gaps.into_iter().take(MAX_DETAILS).collect::<Vec<_>>().join(", ")),
            )
        }
    }

    fn check_price_validity(&self, series: &PriceSeries) -> CheckResult {
        let bad: Vec<String> = series
            .bars()
            .iter()
            .filter(|b| !b.price(self.price_field).map_or(false, |p| p.is_finite() && p > 0.0))
            .map(|b| b.date.to_string())
            .collect();

        if bad.is_empty() {
            CheckResult::pass(
                "price_validity",
                &format!("All {} prices positive", self.price_field),
            )
        } else {
            CheckResult::fail(
                "price_validity",
                &format!("{} bars with missing or non-positive {}", bad.len(), self.price_field),
                Some(bad.into_iter().take(MAX_DETAILS).collect::<Vec<_>>().join(", ")),
            )
        }
    }

    fn check_high_low(&self, series: &PriceSeries) -> CheckResult {
        let inverted = series.bars().iter().filter(|b| b.high < b.low).count();
        if inverted == 0 {
            CheckResult::pass("high_low", "High >= low on every bar")
        } else {
            CheckResult::fail(
                "high_low",
                &format!("{} bars with high below low", inverted),
                None,
            )
        }
    }

    fn check_volume(&self, series: &PriceSeries) -> CheckResult {
        let invalid = series
            .bars()
            .iter()
            .filter(|b| !(b.volume.is_finite() && b.volume >= 0.0))
            .count();
        let zero = series.bars().iter().filter(|b| b.volume == 0.0).count();

        if invalid > 0 {
            CheckResult::fail(
                "volume_validity",
                &format!("{} bars with negative or non-finite volume", invalid),
                None,
            )
        } else {
            CheckResult::pass(
                "volume_validity",
                &format!("Volume valid ({} zero-volume bars)", zero),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceBar;
    use chrono::NaiveDate;

    fn bar(y: i32, m: u32, d: u32, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            adj_close: Some(close),
            volume: 1000.0,
        }
    }

    #[test]
    fn test_check_result() {
        let pass = CheckResult::pass("test", "passed");
        assert!(pass.passed);
        let fail = CheckResult::fail("test", "failed", Some("details".to_string()));
        assert!(!fail.passed);
        assert_eq!(fail.details, Some("details".to_string()));
    }

    #[test]
    fn test_clean_series_passes() {
        let series = PriceSeries::new(
            "AAA",
            vec![bar(2020, 1, 2, 10.0), bar(2020, 1, 3, 11.0), bar(2020, 1, 6, 12.0)],
        )
        .unwrap();
        let report = DataIntegrityValidator::new(PriceField::AdjClose).validate(&series);
        assert!(report.all_passed(), "{:?}", report.failed_checks());
        assert_eq!(report.summary(), "AAA (3 bars): 4/4 checks passed");
    }

    #[test]
    fn test_problems_are_reported() {
        let mut inverted = bar(2020, 1, 3, 11.0);
        inverted.high = 5.0;
        let mut missing = bar(2020, 2, 3, 12.0);
        missing.adj_close = None;
        let series = PriceSeries::new("BBB", vec![bar(2020, 1, 2, 10.0), inverted, missing]).unwrap();

        let report = DataIntegrityValidator::new(PriceField::AdjClose).validate(&series);
        let failed: Vec<&str> = report
            .failed_checks()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(failed, vec!["date_continuity", "price_validity", "high_low"]);

        let close_report = DataIntegrityValidator::new(PriceField::Close).validate(&series);
        assert!(close_report
            .failed_checks()
            .iter()
            .all(|c| c.name != "price_validity"));
    }
}
