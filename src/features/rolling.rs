//! Causal window primitives over NaN-padded columns.
//!
//! Every window ends at (and includes) the current index. A window
//! containing any undefined value yields an undefined result.

use statrs::statistics::Statistics;

/// Apply `f` to each full trailing window of `w` values.
fn rolling<F>(values: &[f64], w: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = vec![f64::NAN; values.len()];
    if w == 0 || values.len() < w {
        return out;
    }
    for end in w..=values.len() {
        let window = &values[end - w..end];
        if window.iter().all(|v| v.is_finite()) {
            out[end - 1] = f(window);
        }
    }
    out
}

pub fn rolling_mean(values: &[f64], w: usize) -> Vec<f64> {
    rolling(values, w, |win| win.iter().mean())
}

/// Sample standard deviation (n - 1 denominator).
pub fn rolling_std(values: &[f64], w: usize) -> Vec<f64> {
    rolling(values, w, |win| win.iter().std_dev())
}

/// `(x - mean) / std` over the trailing window; undefined for a flat window.
pub fn rolling_zscore(values: &[f64], w: usize) -> Vec<f64> {
    rolling(values, w, |win| {
        let sd = win.iter().std_dev();
        let z = (win[win.len() - 1] - win.iter().mean()) / sd;
        if z.is_finite() {
            z
        } else {
            f64::NAN
        }
    })
}

/// Value `k` steps earlier.
pub fn lag(values: &[f64], k: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= k { values[i - k] } else { f64::NAN })
        .collect()
}

/// Value `k` steps later. Only ever used for targets.
pub fn lead(values: &[f64], k: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| values.get(i + k).copied().unwrap_or(f64::NAN))
        .collect()
}

/// `x[i] - x[i - k]`.
pub fn diff(values: &[f64], k: usize) -> Vec<f64> {
    values
        .iter()
        .zip(lag(values, k))
        .map(|(x, prev)| x - prev)
        .collect()
}

/// Natural log, undefined for non-positive input.
pub fn ln_positive(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|v| if *v > 0.0 { v.ln() } else { f64::NAN })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rolling_mean_and_std() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let m = rolling_mean(&x, 3);
        assert!(m[0].is_nan() && m[1].is_nan());
        assert_relative_eq!(m[2], 2.0);
        assert_relative_eq!(m[3], 3.0);

        let s = rolling_std(&x, 3);
        assert_relative_eq!(s[3], 1.0);
    }

    #[test]
    fn test_window_with_gap_is_undefined() {
        let x = [1.0, f64::NAN, 3.0, 4.0, 5.0];
        let m = rolling_mean(&x, 2);
        assert!(m[1].is_nan());
        assert!(m[2].is_nan());
        assert_relative_eq!(m[3], 3.5);
    }

    #[test]
    fn test_zscore_flat_window_undefined() {
        let z = rolling_zscore(&[2.0, 2.0, 2.0], 3);
        assert!(z[2].is_nan());
        let z = rolling_zscore(&[1.0, 2.0, 3.0], 3);
        assert_relative_eq!(z[2], 1.0);
    }

    #[test]
    fn test_shifts() {
        let x = [1.0, 2.0, 4.0];
        assert!(lag(&x, 1)[0].is_nan());
        assert_eq!(lag(&x, 1)[2], 2.0);
        assert_eq!(lead(&x, 1)[0], 2.0);
        assert!(lead(&x, 1)[2].is_nan());
        assert_eq!(diff(&x, 1)[2], 2.0);
        assert!(ln_positive(&[0.0])[0].is_nan());
    }
}
