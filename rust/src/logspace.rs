//! Log-space arithmetic shared by the distributions and the sampler.

use std::cmp::Ordering;

/// `ln(exp(a) + exp(b))`.
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// `ln(exp(a) - exp(b))` for `a >= b`; `None` when the difference is negative or an input
/// is not finite.
pub fn log_sub_exp(a: f64, b: f64) -> Option<f64> {
    if !a.is_finite() || !b.is_finite() || b > a {
        return None;
    }
    if (a - b).abs() < f64::EPSILON {
        return Some(f64::NEG_INFINITY);
    }
    let diff = -(b - a).exp_m1();
    if diff <= 0.0 {
        return Some(f64::NEG_INFINITY);
    }
    Some(a + diff.ln())
}

/// `ln(sum(exp(v)))`; `-inf` for an empty slice.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Ascending order on log-likelihoods with NaN ranked as the lowest value.
pub fn log_ordering(a: f64, b: f64) -> Ordering {
    let key = |v: f64| if v.is_nan() { f64::NEG_INFINITY } else { v };
    key(a).total_cmp(&key(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_exp_handles_infinities() {
        let expected = (3.0f64.exp() + 5.0f64.exp()).ln();
        assert!((log_add_exp(3.0, 5.0) - expected).abs() < 1e-12);
        assert_eq!(log_add_exp(f64::NEG_INFINITY, 2.0), 2.0);
        assert_eq!(log_add_exp(2.0, f64::NEG_INFINITY), 2.0);
        assert_eq!(log_add_exp(f64::NEG_INFINITY, f64::NEG_INFINITY), f64::NEG_INFINITY);
    }

    #[test]
    fn sub_exp_basic_and_edges() {
        let expected = 5.0 + (1.0 - (-2.0f64).exp()).ln();
        assert!((log_sub_exp(5.0, 3.0).unwrap() - expected).abs() < 1e-10);
        assert_eq!(log_sub_exp(5.0, 5.0), Some(f64::NEG_INFINITY));
        assert!(log_sub_exp(3.0, 5.0).is_none());
        assert!(log_sub_exp(f64::NAN, 1.0).is_none());
        assert!(log_sub_exp(100.0, 100.0 - 1e-12).unwrap() < 100.0);
    }

    #[test]
    fn sum_exp_matches_direct_sum() {
        let values = [-1.0, 0.5, 2.0];
        let direct: f64 = values.iter().map(|v: &f64| v.exp()).sum::<f64>().ln();
        assert!((log_sum_exp(&values) - direct).abs() < 1e-12);
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn nan_sorts_first() {
        let mut values = vec![1.0, f64::NAN, f64::NEG_INFINITY, -3.0];
        values.sort_by(|a, b| log_ordering(*a, *b));
        assert!(values[0].is_nan() || values[0] == f64::NEG_INFINITY);
        assert_eq!(values[3], 1.0);
    }
}
