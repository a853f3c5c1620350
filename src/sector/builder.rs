//! Peer selection and synthetic sector index construction.
//!
//! Peers are chosen once, from the training window only. The resulting
//! index is then computed from each peer's full history so it can be
//! joined onto validation and test dates without re-selecting peers.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, info, warn};

use crate::data::{PriceField, ReturnSeries, Universe};
use crate::error::{ForecastError, ForecastResult};
use crate::walkforward::DateWindow;

/// A selected peer and its training-window correlation with the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub ticker: String,
    pub correlation: f64,
}

/// Frozen peer set plus the equal-weighted sector return series.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorIndex {
    pub target: String,
    pub peers: Vec<Peer>,
    /// Spans the union of the peers' full histories.
    pub series: ReturnSeries,
    /// Fewer than `requested_k` candidates qualified.
    pub reduced_peer_count: bool,
    pub requested_k: usize,
}

impl SectorIndex {
    pub fn peer_tickers(&self) -> Vec<&str> {
        self.peers.iter().map(|p| p.ticker.as_str()).collect()
    }
}

/// Builder for a target's sector index.
pub struct SectorIndexBuilder {
    target: String,
    training: DateWindow,
    k: usize,
    price_field: PriceField,
    candidates: Option<Vec<String>>,
    excluded: BTreeSet<String>,
}

impl SectorIndexBuilder {
    pub fn new(
        target: impl Into<String>,
        training: DateWindow,
        k: usize,
        price_field: PriceField,
    ) -> Self {
        Self {
            target: target.into(),
            training,
            k,
            price_field,
            candidates: None,
            excluded: BTreeSet::new(),
        }
    }

    /// Restrict candidates to an explicit ticker list.
    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = Some(candidates);
        self
    }

    /// Never select this ticker (e.g. the market benchmark).
    pub fn exclude(mut self, ticker: impl Into<String>) -> Self {
        self.excluded.insert(ticker.into());
        self
    }

    fn candidate_tickers(&self, universe: &Universe) -> ForecastResult<Vec<String>> {
        let tickers: Vec<String> = match &self.candidates {
            Some(list) => {
                if let Some(unknown) = list.iter().find(|t| !universe.contains_key(*t)) {
                    return Err(ForecastError::config(format!(
                        "unknown candidate ticker '{}'",
                        unknown
                    )));
                }
                list.iter()
                    .filter(|t| **t != self.target && !self.excluded.contains(*t))
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            }
            None => universe
                .keys()
                .filter(|t| **t != self.target && !self.excluded.contains(*t))
                .cloned()
                .collect(),
        };
        Ok(tickers)
    }

    /// Select peers on the training window and build the full-timeline index.
    pub fn build(&self, universe: &Universe) -> ForecastResult<SectorIndex> {
        if self.k == 0 {
            return Err(ForecastError::config("peer count k must be positive"));
        }
        self.training.validate("training")?;

        let target_series = universe.get(&self.target).ok_or_else(|| {
            ForecastError::config(format!("unknown target ticker '{}'", self.target))
        })?;

        let target_returns = target_series
            .window(self.training.start, self.training.end)
            .returns(self.price_field)?;
        if target_returns.is_empty() {
            return Err(ForecastError::config(format!(
                "target '{}' has no data in training window {}",
                self.target, self.training
            )));
        }
        let target_by_date: BTreeMap<NaiveDate, f64> = target_returns.defined().collect();
        if target_by_date.is_empty() {
            return Err(ForecastError::config(format!(
                "target '{}' has no defined return in training window {}",
                self.target, self.training
            )));
        }

        let candidates = self.candidate_tickers(universe)?;
        if self.k > candidates.len() {
            return Err(ForecastError::config(format!(
                "k = {} exceeds the {} candidate tickers in the universe",
                self.k,
                candidates.len()
            )));
        }

        let mut ranked = Vec::new();
        for ticker in &candidates {
            let series = &universe[ticker];
            let in_window = series.window(self.training.start, self.training.end);
            if in_window.is_empty() {
                debug!("{} has no training-window data, skipped", ticker);
                continue;
            }
            let returns = in_window.returns(self.price_field)?;
            match pearson(&target_by_date, &returns) {
                Some(correlation) => ranked.push(Peer {
                    ticker: ticker.clone(),
                    correlation,
                }),
                None => debug!("{} has undefined correlation with {}", ticker, self.target),
            }
        }

        ranked.sort_by(|a, b| {
            b.correlation
                .partial_cmp(&a.correlation)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        let reduced_peer_count = ranked.len() < self.k;
        if reduced_peer_count {
            warn!(
                "Only {} of {} requested peers qualified for {}",
                ranked.len(),
                self.k,
                self.target
            );
        }
        ranked.truncate(self.k);

        if ranked.is_empty() {
            return Err(ForecastError::data(format!(
                "no candidate qualified as a peer for '{}'",
                self.target
            )));
        }

        let mut peer_returns = Vec::with_capacity(ranked.len());
        for peer in &ranked {
            peer_returns.push(universe[&peer.ticker].returns(self.price_field)?);
        }
        let series = equal_weighted_mean(&peer_returns);

        info!(
            "Selected sector peers for {}: {:?}",
            self.target,
            ranked.iter().map(|p| p.ticker.as_str()).collect::<Vec<_>>()
        );

        Ok(SectorIndex {
            target: self.target.clone(),
            peers: ranked,
            series,
            reduced_peer_count,
            requested_k: self.k,
        })
    }
}

/// Pearson correlation over dates where both series are defined.
fn pearson(target: &BTreeMap<NaiveDate, f64>, candidate: &ReturnSeries) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = candidate
        .defined()
        .filter_map(|(date, value)| target.get(&date).map(|t| (*t, value)))
        .unzip();

    if xs.len() < 2 {
        return None;
    }

    let cov = xs.iter().covariance(ys.iter());
    let sx = xs.iter().std_dev();
    let sy = ys.iter().std_dev();
    let corr = cov / (sx * sy);
    corr.is_finite().then_some(corr)
}

/// Per-date mean over the series defined on that date.
fn equal_weighted_mean(series: &[ReturnSeries]) -> ReturnSeries {
    let mut sums: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for s in series {
        for (date, value) in s.dates().iter().zip(s.values()) {
            let entry = sums.entry(*date).or_insert((0.0, 0));
            if value.is_finite() {
                entry.0 += value;
                entry.1 += 1;
            }
        }
    }

    let (dates, values) = sums
        .into_iter()
        .map(|(date, (sum, count))| {
            let mean = if count > 0 { sum / count as f64 } else { f64::NAN };
            (date, mean)
        })
        .unzip();
    ReturnSeries::new(dates, values)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::data::{PriceBar, PriceSeries};
    use crate::testing::{noise, series_from_returns, start_date};

    fn universe() -> Universe {
        let n = 120;
        let base = noise(n, 0.01, 1);
        let a: Vec<f64> = base
            .iter()
            .zip(noise(n, 0.002, 7))
            .map(|(r, e)| r + e)
            .collect();
        let b: Vec<f64> = base
            .iter()
            .zip(noise(n, 0.01, 13))
            .map(|(r, e)| 0.3 * r + e)
            .collect();

        let mut universe = Universe::new();
        universe.insert("TGT".into(), series_from_returns("TGT", &base, 1));
        universe.insert("A".into(), series_from_returns("A", &a, 2));
        universe.insert("B".into(), series_from_returns("B", &b, 3));
        universe
    }

    fn training() -> DateWindow {
        DateWindow::new(start_date(), start_date() + Duration::days(60))
    }

    fn same(x: &[f64], y: &[f64]) -> bool {
        x.len() == y.len()
            && x.iter()
                .zip(y)
                .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b)
    }

    #[test]
    fn test_top_peer_selected_and_index_equals_peer() {
        let universe = universe();
        let index = SectorIndexBuilder::new("TGT", training(), 1, PriceField::AdjClose)
            .build(&universe)
            .unwrap();

        assert_eq!(index.peer_tickers(), vec!["A"]);
        assert!(!index.reduced_peer_count);

        let a_returns = universe["A"].returns(PriceField::AdjClose).unwrap();
        assert_eq!(index.series.dates(), a_returns.dates());
        assert!(same(index.series.values(), a_returns.values()));
        // Full timeline, not just the training window.
        assert_eq!(index.series.len(), 121);
    }

    #[test]
    fn test_ranking_order() {
        let index = SectorIndexBuilder::new("TGT", training(), 2, PriceField::AdjClose)
            .build(&universe())
            .unwrap();
        assert_eq!(index.peer_tickers(), vec!["A", "B"]);
        assert!(index.peers[0].correlation > index.peers[1].correlation);
    }

    #[test]
    fn test_deterministic_rebuild() {
        let universe = universe();
        let builder = SectorIndexBuilder::new("TGT", training(), 2, PriceField::AdjClose);
        let first = builder.build(&universe).unwrap();
        let second = builder.build(&universe).unwrap();
        assert_eq!(first.peers, second.peers);
        assert_eq!(first.series.dates(), second.series.dates());
        assert!(same(first.series.values(), second.series.values()));
    }

    #[test]
    fn test_ties_broken_by_ticker() {
        let mut universe = universe();
        let copy = universe["A"].bars().to_vec();
        universe.insert("AA".into(), PriceSeries::new("AA", copy).unwrap());

        let index = SectorIndexBuilder::new("TGT", training(), 2, PriceField::AdjClose)
            .build(&universe)
            .unwrap();
        assert_eq!(index.peer_tickers(), vec!["A", "AA"]);
    }

    #[test]
    fn test_mean_over_two_peers() {
        let universe = universe();
        let index = SectorIndexBuilder::new("TGT", training(), 2, PriceField::AdjClose)
            .build(&universe)
            .unwrap();
        let a = universe["A"].returns(PriceField::AdjClose).unwrap();
        let b = universe["B"].returns(PriceField::AdjClose).unwrap();
        let expected = (a.values()[100] + b.values()[100]) / 2.0;
        assert!((index.series.values()[100] - expected).abs() < 1e-15);
    }

    #[test]
    fn test_reduced_peer_count_flag() {
        let mut universe = universe();
        // C only trades after the training window.
        let late: Vec<PriceBar> = universe["B"]
            .bars()
            .iter()
            .filter(|b| b.date > start_date() + Duration::days(90))
            .cloned()
            .collect();
        universe.insert("C".into(), PriceSeries::new("C", late).unwrap());

        let index = SectorIndexBuilder::new("TGT", training(), 3, PriceField::AdjClose)
            .build(&universe)
            .unwrap();
        assert!(index.reduced_peer_count);
        assert_eq!(index.peers.len(), 2);
    }

    #[test]
    fn test_configuration_errors() {
        let universe = universe();
        let err = SectorIndexBuilder::new("NOPE", training(), 1, PriceField::AdjClose)
            .build(&universe)
            .unwrap_err();
        assert!(matches!(err, ForecastError::Configuration(_)));

        let err = SectorIndexBuilder::new("TGT", training(), 5, PriceField::AdjClose)
            .build(&universe)
            .unwrap_err();
        assert!(matches!(err, ForecastError::Configuration(_)));

        let err = SectorIndexBuilder::new("TGT", training(), 0, PriceField::AdjClose)
            .build(&universe)
            .unwrap_err();
        assert!(matches!(err, ForecastError::Configuration(_)));

        let late = DateWindow::new(
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2030, 12, 31).unwrap(),
        );
        let err = SectorIndexBuilder::new("TGT", late, 1, PriceField::AdjClose)
            .build(&universe)
            .unwrap_err();
        assert!(matches!(err, ForecastError::Configuration(_)));
    }

    #[test]
    fn test_single_bar_target_window_is_configuration_error() {
        let day = start_date() + Duration::days(10);
        let one_day = DateWindow::new(day, day);
        let err = SectorIndexBuilder::new("TGT", one_day, 1, PriceField::AdjClose)
            .build(&universe())
            .unwrap_err();
        match err {
            ForecastError::Configuration(msg) => assert!(msg.contains("TGT")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_excluded_ticker_not_selected() {
        let index = SectorIndexBuilder::new("TGT", training(), 1, PriceField::AdjClose)
            .exclude("A")
            .build(&universe())
            .unwrap();
        assert_eq!(index.peer_tickers(), vec!["B"]);
    }
}
