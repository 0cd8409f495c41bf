//! Common time and unit helpers for lift_core.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Compute the period in microseconds for a given sampling rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 microsecond.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Compute the step interval in microseconds for a speed in steps per second.
/// - Uses the magnitude of `speed`; direction is tracked by the caller.
/// - Returns `None` for zero or non-finite speeds, which must not step.
#[inline]
pub fn step_interval_us(speed: f32) -> Option<u64> {
    if speed == 0.0 || !speed.is_finite() {
        return None;
    }
    Some((MICROS_PER_SEC as f32 / speed.abs()) as u64)
}

/// Round a millimetre value to hundredths for operator display.
#[inline]
pub fn round_to_hundredths(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_clamps_rate_and_floor() {
        assert_eq!(period_us(0), 1_000_000);
        assert_eq!(period_us(200), 5_000);
        assert_eq!(period_us(u32::MAX), 1);
    }

    #[test]
    fn interval_matches_speed() {
        assert_eq!(step_interval_us(1600.0), Some(625));
        assert_eq!(step_interval_us(-1600.0), Some(625));
        assert_eq!(step_interval_us(1.0), Some(1_000_000));
    }

    #[test]
    fn zero_and_nan_do_not_step() {
        assert_eq!(step_interval_us(0.0), None);
        assert_eq!(step_interval_us(f32::NAN), None);
        assert_eq!(step_interval_us(f32::INFINITY), None);
    }

    #[test]
    fn display_rounding() {
        assert!((round_to_hundredths(1.005_1) - 1.01).abs() < 1e-6);
        assert!((round_to_hundredths(-0.004) - 0.0).abs() < 1e-6);
    }
}
