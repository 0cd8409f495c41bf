//! Background input collection.
//!
//! Spawns a thread that owns the `ControlPanel`, merges the edges it reports
//! into a bounded channel, and mirrors the live jog levels into atomics. The
//! merge guarantees that a press collected between two controller ticks is
//! never lost, only delayed by one tick.
//!
//! Safety: each `InputSampler` owns exactly one thread and joins it on drop.
use crossbeam_channel as xch;
use lift_traits::clock::Clock;
use lift_traits::{ControlPanel, InputSnapshot};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

pub struct InputSampler {
    rx: xch::Receiver<InputSnapshot>,
    up: Arc<AtomicBool>,
    down: Arc<AtomicBool>,
    last_ok: Arc<AtomicU64>,
    epoch: Instant,
    /// Tells the thread to exit; checked every cycle.
    shutdown: Arc<AtomicBool>,
    /// Joined on drop.
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl InputSampler {
    pub fn spawn<P: ControlPanel + Send + 'static, C: Clock + Send + Sync + 'static>(
        mut panel: P,
        hz: u32,
        clock: C,
    ) -> Self {
        let (tx, rx) = xch::bounded(1);
        let up = Arc::new(AtomicBool::new(false));
        let down = Arc::new(AtomicBool::new(false));
        let up_clone = up.clone();
        let down_clone = down.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_clone = last_ok.clone();
        let period = Duration::from_micros(crate::util::period_us(hz));
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            // Edges not yet handed over; merged rather than dropped when the
            // channel is full.
            let mut pending = InputSnapshot::default();
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("input sampler thread received shutdown signal");
                    break;
                }

                match panel.poll() {
                    Ok(snap) => {
                        pending.merge(&snap);
                        if !pending.is_empty() {
                            match tx.try_send(pending) {
                                Ok(()) => pending = InputSnapshot::default(),
                                // Consumer has not caught up; keep merging.
                                Err(xch::TrySendError::Full(_)) => {}
                                Err(xch::TrySendError::Disconnected(_)) => {
                                    tracing::debug!(
                                        "input sampler consumer disconnected, exiting thread"
                                    );
                                    break;
                                }
                            }
                        }
                        up_clone.store(panel.up_held().unwrap_or(false), Ordering::Relaxed);
                        down_clone.store(panel.down_held().unwrap_or(false), Ordering::Relaxed);
                        let now = clock.ms_since(epoch);
                        last_ok_clone.store(now, Ordering::Relaxed);
                    }
                    Err(_) => {
                        // Transient read error; last_ok stops advancing so
                        // callers see the outage as a stall.
                    }
                }

                // Re-check before sleeping so drop never waits out a full period.
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("input sampler thread exiting cleanly");
        });

        Self {
            rx,
            up,
            down,
            last_ok,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Milliseconds since the last successful panel poll, given the caller's
    /// notion of now.
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    /// Convenience helper: compute the stall against this sampler's epoch and
    /// a real monotonic clock.
    pub fn stalled_for_now(&self) -> u64 {
        let now_ms = {
            let dur = Instant::now().saturating_duration_since(self.epoch);
            let ms = dur.as_millis();
            (ms.min(u128::from(u64::MAX))) as u64
        };
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }
}

impl ControlPanel for InputSampler {
    /// Drain and merge everything the collector thread has queued.
    fn poll(&mut self) -> Result<InputSnapshot, BoxedError> {
        let mut merged = InputSnapshot::default();
        for snap in self.rx.try_iter() {
            merged.merge(&snap);
        }
        Ok(merged)
    }

    fn up_held(&mut self) -> Result<bool, BoxedError> {
        Ok(self.up.load(Ordering::Relaxed))
    }

    fn down_held(&mut self) -> Result<bool, BoxedError> {
        Ok(self.down.load(Ordering::Relaxed))
    }
}

impl Drop for InputSampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("input sampler thread joined successfully");
                }
                Err(e) => {
                    // Never panic out of Drop.
                    tracing::warn!(?e, "input sampler thread panicked during shutdown");
                }
            }
        }
    }
}
