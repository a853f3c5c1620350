//! Out-of-fold prediction matrix with explicit coverage.

use chrono::NaiveDate;
use nalgebra::DMatrix;

/// Rows are validation dates, columns are base-model ids.
///
/// A row is covered once every model has predicted it. Coverage is tracked
/// separately from the values, so a prediction of exactly 0.0 still counts.
#[derive(Debug, Clone, PartialEq)]
pub struct OofMatrix {
    dates: Vec<NaiveDate>,
    model_ids: Vec<String>,
    values: DMatrix<f64>,
    covered: Vec<bool>,
    targets: Vec<f64>,
}

impl OofMatrix {
    pub(crate) fn new(dates: Vec<NaiveDate>, model_ids: Vec<String>, targets: Vec<f64>) -> Self {
        let n = dates.len();
        let m = model_ids.len();
        Self {
            dates,
            model_ids,
            values: DMatrix::from_element(n, m, f64::NAN),
            covered: vec![false; n],
            targets,
        }
    }

    /// Store one fold's predictions (rows `start..`, one column per model).
    pub(crate) fn fill(&mut self, start: usize, predictions: &[Vec<f64>]) {
        for (col, preds) in predictions.iter().enumerate() {
            for (offset, value) in preds.iter().enumerate() {
                self.values[(start + offset, col)] = *value;
            }
        }
        let rows = predictions.first().map_or(0, |p| p.len());
        for flag in &mut self.covered[start..start + rows] {
            *flag = true;
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn model_ids(&self) -> &[String] {
        &self.model_ids
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn covered(&self) -> &[bool] {
        &self.covered
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn covered_count(&self) -> usize {
        self.covered.iter().filter(|c| **c).count()
    }

    /// Meta-training inputs: covered rows of the matrix and their targets.
    pub fn covered_rows(&self) -> (DMatrix<f64>, Vec<f64>) {
        let rows: Vec<usize> = (0..self.len()).filter(|&i| self.covered[i]).collect();
        let x = DMatrix::from_fn(rows.len(), self.model_ids.len(), |i, j| {
            self.values[(rows[i], j)]
        });
        let y = rows.iter().map(|&i| self.targets[i]).collect();
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::daily_dates;

    #[test]
    fn test_zero_prediction_is_covered() {
        let mut oof = OofMatrix::new(
            daily_dates(6),
            vec!["a".into(), "b".into()],
            vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
        );
        oof.fill(2, &[vec![0.0, 0.0], vec![1.0, 2.0]]);
        oof.fill(4, &[vec![0.0, 0.0], vec![3.0, 4.0]]);

        assert_eq!(oof.covered(), &[false, false, true, true, true, true]);
        assert_eq!(oof.covered_count(), 4);

        let (x, y) = oof.covered_rows();
        assert_eq!(x.shape(), (4, 2));
        assert_eq!(x[(0, 0)], 0.0);
        assert_eq!(x[(3, 1)], 4.0);
        assert_eq!(y, vec![0.3, 0.4, 0.5, 0.6]);
        assert!(oof.values()[(0, 0)].is_nan());
    }
}
