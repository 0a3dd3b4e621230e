//! Descriptive statistics over coerced numeric columns.
//!
//! Every function skips absent and non-finite inputs through [`present`].
//! Undefined results are `NaN`, which serializes as JSON `null`.

pub mod privacy;

pub use privacy::{
    mask_count, safe_counts_and_proportions_groupwise, MaskedCount, MaskedProportion,
    PRIVACY_THRESHOLD,
};

/// Values that are present and finite
pub fn present(values: &[Option<f64>]) -> Vec<f64> {
    values
        .iter()
        .filter_map(|v| *v)
        .filter(|v| v.is_finite())
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (one delta degree of freedom)
pub fn std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (n - 1) as f64).sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Quantile with linear interpolation between the two closest ranks
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Adjusted Fisher-Pearson sample skewness.
///
/// Undefined below three values; zero when all values are equal.
pub fn skew(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return f64::NAN;
    }
    let m = mean(values);
    let (mut m2, mut m3) = (0.0, 0.0);
    for v in values {
        let d = v - m;
        m2 += d * d;
        m3 += d * d * d;
    }
    // sums of squares this small are rounding noise around a constant column
    if m2.abs() < 1e-14 * m.abs().max(1.0) {
        return 0.0;
    }
    let n = n as f64;
    (n * (n - 1.0).sqrt() / (n - 2.0)) * (m3 / m2.powf(1.5))
}

pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NAN, f64::min)
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NAN, f64::max)
}

/// Round to a number of decimal places; `NaN` stays `NaN`
pub fn round_to(value: f64, digits: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// `None` for an undefined value, the value otherwise
pub fn defined(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

/// Number of values outside `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`
pub fn iqr_outlier_count(values: &[f64]) -> usize {
    let q1 = quantile(values, 0.25);
    let q3 = quantile(values, 0.75);
    let iqr = q3 - q1;
    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;
    values.iter().filter(|&&v| v < lower || v > upper).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_mean_and_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(close(mean(&values), 5.0));
        // sum of squared deviations is 32 over 7 degrees of freedom
        assert!(close(std(&values), (32.0f64 / 7.0).sqrt()));
        assert!(std(&[1.0]).is_nan());
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn test_quantiles_interpolate() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert!(close(median(&values), 2.5));
        assert!(close(quantile(&values, 0.25), 1.75));
        assert!(close(quantile(&values, 0.75), 3.25));
        assert!(close(quantile(&[7.0], 0.25), 7.0));
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_skew() {
        assert!(close(skew(&[1.0, 2.0, 3.0]), 0.0));
        assert!(close(skew(&[5.0, 5.0, 5.0, 5.0]), 0.0));
        assert!(skew(&[1.0, 2.0]).is_nan());
        // deviations from the mean 4/3 are -4/3, -1/3 and 5/3
        let s = skew(&[0.0, 1.0, 3.0]);
        let m2: f64 = 16.0 / 9.0 + 1.0 / 9.0 + 25.0 / 9.0;
        let m3: f64 = -64.0 / 27.0 - 1.0 / 27.0 + 125.0 / 27.0;
        let expected = 3.0 * 2f64.sqrt() * (m3 / m2.powf(1.5));
        assert!(close(s, expected));
    }

    #[test]
    fn test_round_to() {
        assert!(close(round_to(1.23456, 2), 1.23));
        assert!(close(round_to(2.0 / 3.0, 3), 0.667));
        assert!(round_to(f64::NAN, 2).is_nan());
    }

    #[test]
    fn test_present_skips_missing_and_non_finite() {
        let values = [Some(1.0), None, Some(f64::NAN), Some(f64::INFINITY), Some(3.0)];
        assert_eq!(present(&values), vec![1.0, 3.0]);
    }

    #[test]
    fn test_iqr_outliers() {
        let values = [1.0, 2.0, 3.0, 4.0, 100.0];
        // Q1 = 2, Q3 = 4, upper fence = 7
        assert_eq!(iqr_outlier_count(&values), 1);
        assert_eq!(iqr_outlier_count(&[]), 0);
    }

    #[test]
    fn test_min_max() {
        assert!(close(min(&[3.0, 1.0, 2.0]), 1.0));
        assert!(close(max(&[3.0, 1.0, 2.0]), 3.0));
        assert!(min(&[]).is_nan());
    }
}
