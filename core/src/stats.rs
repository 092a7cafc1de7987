//! Window statistics over plain `f64` slices.
//!
//! RULE: No NaN skipping in sum/mean/std. Non-finite inputs flow through
//! standard IEEE-754 arithmetic. Percentiles are taken over the non-NaN
//! values only, and NaN never satisfies a strict comparison.

pub fn sum(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc, v| acc + v)
}

/// Arithmetic mean. Empty input yields NaN.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    sum(values) / values.len() as f64
}

/// Sample standard deviation (n − 1 denominator).
/// A single value yields NaN through 0/0.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sq / (values.len() as f64 - 1.0)).sqrt()
}

/// Quantile `q` in [0, 1] with linear interpolation between closest ranks.
/// NaN values are ignored; all-NaN or empty input yields NaN.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    lerp(sorted[lo], sorted[hi], pos - lo as f64)
}

// Interpolates from whichever end is closer so that t = 0 and t = 1
// return the endpoints exactly, even for infinite endpoints.
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    if a == b {
        return a;
    }
    let diff = b - a;
    if t >= 0.5 {
        b - diff * (1.0 - t)
    } else {
        a + diff * t
    }
}

pub fn count_above(values: &[f64], threshold: f64) -> u32 {
    values.iter().filter(|v| **v > threshold).count() as u32
}

pub fn count_below(values: &[f64], threshold: f64) -> u32 {
    values.iter().filter(|v| **v < threshold).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // Population std is 2.0; sample std is sqrt(32 / 7).
        assert!(close(sample_std(&v), (32.0f64 / 7.0).sqrt()));
    }

    #[test]
    fn single_value_std_is_nan() {
        assert!(sample_std(&[3.5]).is_nan());
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let v = [10.0, 20.0, 30.0, 40.0];
        // pos = 0.9 * 3 = 2.7 -> 30 + 0.7 * 10
        assert!(close(quantile(&v, 0.9), 37.0));
        // pos = 0.1 * 3 = 0.3 -> 10 + 0.3 * 10
        assert!(close(quantile(&v, 0.1), 13.0));
        assert_eq!(quantile(&v, 0.0), 10.0);
        assert_eq!(quantile(&v, 1.0), 40.0);
    }

    #[test]
    fn quantile_ignores_nan_and_handles_empty() {
        assert!(quantile(&[], 0.5).is_nan());
        assert!(quantile(&[f64::NAN, f64::NAN], 0.5).is_nan());
        assert_eq!(quantile(&[f64::NAN, 4.0], 0.9), 4.0);
    }

    #[test]
    fn quantile_with_infinite_endpoints() {
        let v = [f64::INFINITY, f64::INFINITY];
        assert_eq!(quantile(&v, 0.9), f64::INFINITY);
    }

    #[test]
    fn infinity_propagates_through_moments() {
        let v = [1.0, f64::INFINITY];
        assert_eq!(sum(&v), f64::INFINITY);
        assert_eq!(mean(&v), f64::INFINITY);
        // inf - inf inside the deviation
        assert!(sample_std(&v).is_nan());

        let v = [f64::INFINITY, f64::NEG_INFINITY];
        assert!(sum(&v).is_nan());
    }

    #[test]
    fn strict_counts_never_match_nan() {
        let v = [1.0, f64::NAN, 5.0];
        assert_eq!(count_above(&v, 2.0), 1);
        assert_eq!(count_below(&v, 2.0), 1);
        assert_eq!(count_above(&v, f64::NAN), 0);
    }
}
