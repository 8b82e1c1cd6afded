//! Conversions between clock periods and integer rates.

/// Converts the time between two ticks into a whole number of ticks per
/// second, rounding half away from zero.
///
/// Returns `None` for elapsed times that are zero, negative, or not finite.
#[must_use]
pub fn rate_from_elapsed(elapsed_seconds: f64) -> Option<i32> {
    if !elapsed_seconds.is_finite() || elapsed_seconds <= 0.0 {
        return None;
    }

    let rate = (1.0 / elapsed_seconds).round().min(f64::from(i32::MAX));

    #[allow(clippy::cast_possible_truncation)]
    let rate = rate as i32;
    Some(rate)
}

/// The fixed step interval that runs a clock at `rate` ticks per second.
///
/// Returns `None` if `rate` is not positive.
#[must_use]
pub fn step_interval(rate: i32) -> Option<f64> {
    (rate > 0).then(|| 1.0 / f64::from(rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_rounds_to_nearest() {
        assert_eq!(rate_from_elapsed(1.0 / 60.0), Some(60));
        assert_eq!(rate_from_elapsed(0.021), Some(48));
        // 1 / 0.4 = 2.5 rounds away from zero
        assert_eq!(rate_from_elapsed(0.4), Some(3));
    }

    #[test]
    fn rate_rejects_degenerate_elapsed() {
        assert_eq!(rate_from_elapsed(0.0), None);
        assert_eq!(rate_from_elapsed(-0.016), None);
        assert_eq!(rate_from_elapsed(f64::NAN), None);
        assert_eq!(rate_from_elapsed(f64::INFINITY), None);
    }

    #[test]
    fn tiny_elapsed_saturates() {
        assert_eq!(rate_from_elapsed(f64::MIN_POSITIVE), Some(i32::MAX));
    }

    #[test]
    fn interval_of_rate() {
        assert_eq!(step_interval(50), Some(0.02));
        assert_eq!(step_interval(0), None);
        assert_eq!(step_interval(-1), None);
    }
}
