//! Expanding-window time-series folds.

use std::ops::Range;

use crate::error::{ForecastError, ForecastResult};

/// Train on every row before `test`, predict `test`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Split `n` ordered rows into `k` expanding folds.
///
/// The fold size is `n / (k + 1)`. The first `n - k * fold_size` rows only
/// ever train; each fold predicts the next `fold_size` rows.
pub fn time_series_folds(n: usize, k: usize) -> ForecastResult<Vec<Fold>> {
    if k == 0 {
        return Err(ForecastError::config("number of folds must be positive"));
    }
    let fold_size = n / (k + 1);
    if fold_size == 0 {
        return Err(ForecastError::data(format!(
            "{} rows cannot be split into {} folds",
            n, k
        )));
    }

    let first = n - k * fold_size;
    Ok((0..k)
        .map(|i| {
            let start = first + i * fold_size;
            Fold {
                train: 0..start,
                test: start..start + fold_size,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_layout() {
        let folds = time_series_folds(23, 5).unwrap();
        // fold size 3, initial block 8
        assert_eq!(folds.len(), 5);
        assert_eq!(folds[0], Fold { train: 0..8, test: 8..11 });
        assert_eq!(folds[4], Fold { train: 0..20, test: 20..23 });
    }

    #[test]
    fn test_folds_are_contiguous_and_causal() {
        let folds = time_series_folds(100, 4).unwrap();
        for pair in folds.windows(2) {
            assert_eq!(pair[0].test.end, pair[1].test.start);
        }
        assert!(folds.iter().all(|f| f.train.end == f.test.start));
        assert_eq!(folds.last().unwrap().test.end, 100);
    }

    #[test]
    fn test_too_few_rows() {
        assert!(matches!(
            time_series_folds(5, 5),
            Err(ForecastError::DataQuality(_))
        ));
        assert!(matches!(
            time_series_folds(50, 0),
            Err(ForecastError::Configuration(_))
        ));
    }
}
