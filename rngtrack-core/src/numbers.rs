//! Numeric conversion helpers centralizing safe casts and percentage math.

use num_traits::cast::cast;

/// Convert u64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn u64_to_f64(value: u64) -> f64 {
    cast::<u64, f64>(value).unwrap_or(0.0)
}

/// `(part / whole) * 100`, or `None` when `whole` is zero.
#[must_use]
pub fn percent_of(part: u64, whole: u64) -> Option<f64> {
    if whole == 0 {
        return None;
    }
    let pct = u64_to_f64(part) / u64_to_f64(whole) * 100.0;
    pct.is_finite().then_some(pct)
}

/// Round to two decimal places for display, returning 0.0 for non-finite values.
#[must_use]
pub fn round_2dp(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_guards_zero_total() {
        assert_eq!(percent_of(3, 0), None);
        assert_eq!(percent_of(0, 0), None);
        assert!((percent_of(3, 20).unwrap() - 15.0).abs() < 1e-9);
        assert!((percent_of(0, 20).unwrap()).abs() < f64::EPSILON);
    }

    #[test]
    fn rounding_handles_non_finite() {
        assert!((round_2dp(f64::NAN)).abs() < f64::EPSILON);
        assert!((round_2dp(33.333_333) - 33.33).abs() < 1e-9);
        assert!((round_2dp(-4.996) + 5.0).abs() < 1e-9);
    }
}
