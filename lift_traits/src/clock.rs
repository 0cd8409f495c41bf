use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock abstraction for control and timing across the stack.
///
/// - now(): returns a monotonic Instant
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - ms_since()/us_since(): elapsed time from an epoch Instant
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_millis() as u64
    }

    /// Microseconds elapsed since `epoch`. Step scheduling works at this
    /// resolution.
    fn us_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_micros() as u64
    }
}

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Deterministic clock for the simulated bench and time-dependent tests.
///
/// now() = origin + offset; sleep(d) advances the offset without sleeping.
/// An optional auto-tick advances the offset on every now() call, which lets
/// loops that gate steps on elapsed time make progress without wall time.
/// Clones share the same offset.
#[derive(Debug, Clone)]
pub struct SimClock {
    origin: Instant,
    offset: std::sync::Arc<std::sync::Mutex<Duration>>,
    auto_tick: Duration,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock {
    pub fn new() -> Self {
        Self::with_auto_tick(Duration::ZERO)
    }

    /// Clock that advances by `tick` on every `now()` read.
    pub fn with_auto_tick(tick: Duration) -> Self {
        Self {
            origin: Instant::now(),
            offset: std::sync::Arc::new(std::sync::Mutex::new(Duration::ZERO)),
            auto_tick: tick,
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }

    /// Simulated time elapsed since the origin.
    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        let mut off = match self.offset.lock() {
            Ok(g) => g,
            Err(_) => return self.origin,
        };
        let t = self.origin + *off;
        *off = off.saturating_add(self.auto_tick);
        t
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_clock_sleep_advances_without_blocking() {
        let clock = SimClock::new();
        let epoch = clock.now();
        clock.sleep(Duration::from_millis(1500));
        assert_eq!(clock.ms_since(epoch), 1500);
    }

    #[test]
    fn sim_clock_auto_tick_moves_time_on_read() {
        let clock = SimClock::with_auto_tick(Duration::from_micros(500));
        let epoch = clock.now();
        // Each read advances by the tick, so the third read sees two ticks.
        let _ = clock.now();
        assert_eq!(clock.us_since(epoch), 1000);
    }

    #[test]
    fn sim_clock_clones_share_time() {
        let clock = SimClock::new();
        let other = clock.clone();
        let epoch = clock.now();
        other.advance(Duration::from_millis(250));
        assert_eq!(clock.ms_since(epoch), 250);
    }
}
