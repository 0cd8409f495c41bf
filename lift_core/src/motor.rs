//! Step scheduling for the lift spindle.
//!
//! `MotorDrive` turns speed and position commands into individual step pulses
//! on a `StepDevice`, using the classic constant-jerk ramp from D. Austin's
//! "Generate stepper-motor speed profiles in real time" (Embedded Systems
//! Programming, 2005). Two driving modes exist:
//!
//! - constant speed: `set_speed` then `run_speed` each tick
//! - ramped positioning: `move_to`/`move_by` then `run` each tick
//!
//! All positions are raw signed step counts; the machine direction sign is
//! applied by the caller. Time comes from the injected clock so the ramp is
//! testable without wall time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use lift_traits::clock::Clock;
use lift_traits::StepDevice;

use crate::error::{LiftError, Result};
use crate::hw_error::map_hw_error;
use crate::util::{MICROS_PER_SEC, step_interval_us};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepDir {
    Forward,
    Backward,
}

pub struct MotorDrive<D: StepDevice> {
    device: D,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,

    current_pos: i64,
    target_pos: i64,
    /// Signed steps per second; sign tracks `dir`.
    speed: f32,
    max_speed: f32,
    acceleration: f32,
    /// Microseconds between steps; 0 means no stepping.
    step_interval_us: u64,
    last_step_us: u64,
    dir: StepDir,

    // Ramp bookkeeping: step counter within the ramp, initial interval,
    // current interval and the floor the interval converges to.
    ramp_step: i64,
    c0_us: f32,
    cn_us: f32,
    cmin_us: f32,
}

impl<D: StepDevice> core::fmt::Debug for MotorDrive<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MotorDrive")
            .field("current_pos", &self.current_pos)
            .field("target_pos", &self.target_pos)
            .field("speed", &self.speed)
            .finish()
    }
}

impl<D: StepDevice> MotorDrive<D> {
    /// A drive with no usable limits yet; callers apply `set_max_speed` and
    /// `set_acceleration` from the loaded settings before commanding motion.
    pub fn new(device: D, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        Self {
            device,
            clock,
            epoch,
            current_pos: 0,
            target_pos: 0,
            speed: 0.0,
            max_speed: 1.0,
            acceleration: 0.0,
            step_interval_us: 0,
            last_step_us: 0,
            dir: StepDir::Forward,
            ramp_step: 0,
            c0_us: 0.0,
            cn_us: 0.0,
            cmin_us: 1.0,
        }
    }

    #[must_use]
    pub fn current_position(&self) -> i64 {
        self.current_pos
    }

    #[must_use]
    pub fn target_position(&self) -> i64 {
        self.target_pos
    }

    #[must_use]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    #[must_use]
    pub fn max_speed(&self) -> f32 {
        self.max_speed
    }

    #[must_use]
    pub fn distance_to_go(&self) -> i64 {
        self.target_pos - self.current_pos
    }

    #[must_use]
    pub fn at_target(&self) -> bool {
        self.distance_to_go() == 0
    }

    /// Rebase the step counter. Cancels any pending motion.
    pub fn set_current_position(&mut self, position: i64) {
        self.target_pos = position;
        self.current_pos = position;
        self.ramp_step = 0;
        self.step_interval_us = 0;
        self.speed = 0.0;
    }

    /// Set the speed for `run_speed`, clamped to the configured maximum.
    pub fn set_speed(&mut self, speed: f32) {
        if speed == self.speed {
            return;
        }
        let speed = speed.clamp(-self.max_speed, self.max_speed);
        if speed == 0.0 {
            self.step_interval_us = 0;
        } else {
            self.step_interval_us = step_interval_us(speed).unwrap_or(0);
            self.dir = if speed > 0.0 {
                StepDir::Forward
            } else {
                StepDir::Backward
            };
        }
        self.speed = speed;
    }

    pub fn set_max_speed(&mut self, speed: f32) {
        let speed = speed.abs();
        if self.max_speed != speed {
            self.max_speed = speed;
            self.cmin_us = MICROS_PER_SEC as f32 / speed;
            // Recompute an in-flight ramp against the new ceiling.
            if self.ramp_step > 0 {
                self.ramp_step = self.steps_to_stop();
                self.compute_new_speed();
            }
        }
    }

    /// Zero is ignored so a misconfigured profile cannot stall the ramp with
    /// a divide-by-zero interval.
    pub fn set_acceleration(&mut self, acceleration: f32) {
        if acceleration == 0.0 {
            return;
        }
        let acceleration = acceleration.abs();
        if self.acceleration != acceleration {
            self.ramp_step = (self.ramp_step as f32 * (self.acceleration / acceleration)) as i64;
            self.c0_us = 0.676 * (2.0 / acceleration).sqrt() * MICROS_PER_SEC as f32;
            self.acceleration = acceleration;
            self.compute_new_speed();
        }
    }

    /// Schedule a ramped move to an absolute step position.
    pub fn move_to(&mut self, absolute: i64) {
        if self.target_pos != absolute {
            self.target_pos = absolute;
            self.compute_new_speed();
        }
    }

    /// Schedule a ramped move relative to the current position.
    pub fn move_by(&mut self, relative: i64) {
        self.move_to(self.current_pos + relative);
    }

    /// Emit at most one constant-speed step if its interval has elapsed.
    /// Returns whether a step was taken.
    pub fn run_speed(&mut self) -> Result<bool> {
        if self.step_interval_us == 0 {
            return Ok(false);
        }
        let now_us = self.clock.us_since(self.epoch);
        if now_us.saturating_sub(self.last_step_us) < self.step_interval_us {
            return Ok(false);
        }
        self.step_once()?;
        self.last_step_us = now_us;
        Ok(true)
    }

    /// Emit at most one ramped step toward the target. Returns whether the
    /// drive still has motion pending.
    pub fn run(&mut self) -> Result<bool> {
        if self.run_speed()? {
            self.compute_new_speed();
        }
        Ok(self.speed != 0.0 || self.distance_to_go() != 0)
    }

    /// Drive to `target` with the ramp profile, blocking the caller.
    ///
    /// The loop is capped by `budget` of clock time; exhausting it means the
    /// mechanics did not move as commanded.
    pub fn run_to_position(&mut self, target: i64, budget: Duration) -> Result<()> {
        let start = self.clock.now();
        self.move_to(target);
        while self.run().wrap_err("positioning step")? {
            if self.clock.now().saturating_duration_since(start) > budget {
                self.halt();
                return Err(LiftError::HardwareFault(format!(
                    "positioning to {target} did not finish within {}ms",
                    budget.as_millis()
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Stop stepping and cancel the pending target.
    pub fn halt(&mut self) {
        self.set_speed(0.0);
        self.move_by(0);
    }

    fn step_once(&mut self) -> Result<()> {
        match self.dir {
            StepDir::Forward => {
                self.device
                    .step_forward()
                    .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
                    .wrap_err("step forward")?;
                self.current_pos += 1;
            }
            StepDir::Backward => {
                self.device
                    .step_backward()
                    .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
                    .wrap_err("step backward")?;
                self.current_pos -= 1;
            }
        }
        Ok(())
    }

    fn steps_to_stop(&self) -> i64 {
        if self.acceleration > 0.0 {
            ((self.speed * self.speed) / (2.0 * self.acceleration)) as i64
        } else {
            0
        }
    }

    /// Advance the ramp by one planning step after a step pulse (or a target
    /// or profile change) and derive the next interval.
    fn compute_new_speed(&mut self) {
        let distance_to = self.distance_to_go();
        let steps_to_stop = self.steps_to_stop();

        if distance_to == 0 && steps_to_stop <= 1 {
            // Arrived and slow enough to stop dead.
            self.step_interval_us = 0;
            self.speed = 0.0;
            self.ramp_step = 0;
            return;
        }

        if distance_to > 0 {
            // Target is ahead: begin braking when the stopping distance
            // reaches it, or immediately when currently moving away.
            if self.ramp_step > 0 {
                if steps_to_stop >= distance_to || self.dir == StepDir::Backward {
                    self.ramp_step = -steps_to_stop;
                }
            } else if self.ramp_step < 0
                && steps_to_stop < distance_to
                && self.dir == StepDir::Forward
            {
                self.ramp_step = -self.ramp_step;
            }
        } else if distance_to < 0 {
            if self.ramp_step > 0 {
                if steps_to_stop >= -distance_to || self.dir == StepDir::Forward {
                    self.ramp_step = -steps_to_stop;
                }
            } else if self.ramp_step < 0
                && steps_to_stop < -distance_to
                && self.dir == StepDir::Backward
            {
                self.ramp_step = -self.ramp_step;
            }
        }

        if self.ramp_step == 0 {
            // First step of a fresh ramp.
            self.cn_us = self.c0_us;
            self.dir = if distance_to > 0 {
                StepDir::Forward
            } else {
                StepDir::Backward
            };
        } else {
            self.cn_us -= (2.0 * self.cn_us) / (4 * self.ramp_step + 1) as f32;
            self.cn_us = self.cn_us.max(self.cmin_us);
        }
        self.ramp_step += 1;
        self.step_interval_us = self.cn_us as u64;
        self.speed = MICROS_PER_SEC as f32 / self.cn_us;
        if self.dir == StepDir::Backward {
            self.speed = -self.speed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lift_traits::clock::SimClock;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct CountingDevice {
        forward: Rc<Cell<u64>>,
        backward: Rc<Cell<u64>>,
    }

    impl StepDevice for CountingDevice {
        fn step_forward(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.forward.set(self.forward.get() + 1);
            Ok(())
        }
        fn step_backward(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.backward.set(self.backward.get() + 1);
            Ok(())
        }
    }

    fn drive_with_tick(tick_us: u64) -> (MotorDrive<CountingDevice>, CountingDevice, SimClock) {
        let clock = SimClock::with_auto_tick(Duration::from_micros(tick_us));
        let device = CountingDevice::default();
        let mut drive = MotorDrive::new(device.clone(), Arc::new(clock.clone()));
        drive.set_max_speed(1600.0);
        drive.set_acceleration(400.0);
        (drive, device, clock)
    }

    #[test]
    fn constant_speed_steps_at_interval() {
        let (mut drive, device, _clock) = drive_with_tick(625);
        drive.set_speed(1600.0);
        for _ in 0..10 {
            drive.run_speed().unwrap();
        }
        assert!(device.forward.get() >= 8);
        assert_eq!(device.backward.get(), 0);
        assert_eq!(drive.current_position() as u64, device.forward.get());
    }

    #[test]
    fn set_speed_clamps_to_max() {
        let (mut drive, _device, _clock) = drive_with_tick(100);
        drive.set_speed(5000.0);
        assert!((drive.speed() - 1600.0).abs() < f32::EPSILON);
        drive.set_speed(-5000.0);
        assert!((drive.speed() + 1600.0).abs() < f32::EPSILON);
    }

    #[test]
    fn zero_speed_never_steps() {
        let (mut drive, device, _clock) = drive_with_tick(1000);
        drive.set_speed(0.0);
        for _ in 0..100 {
            assert!(!drive.run_speed().unwrap());
        }
        assert_eq!(device.forward.get() + device.backward.get(), 0);
    }

    #[test]
    fn ramped_move_reaches_target_and_stops() {
        let (mut drive, _device, _clock) = drive_with_tick(200);
        drive.move_to(120);
        let mut guard = 0u64;
        while drive.run().unwrap() {
            guard += 1;
            assert!(guard < 2_000_000, "ramp never settled");
        }
        assert_eq!(drive.current_position(), 120);
        assert!(drive.at_target());
        assert_eq!(drive.speed(), 0.0);
    }

    #[test]
    fn ramped_move_backward() {
        let (mut drive, device, _clock) = drive_with_tick(200);
        drive.move_to(-60);
        let mut guard = 0u64;
        while drive.run().unwrap() {
            guard += 1;
            assert!(guard < 2_000_000, "ramp never settled");
        }
        assert_eq!(drive.current_position(), -60);
        assert_eq!(device.backward.get(), 60);
        assert_eq!(device.forward.get(), 0);
    }

    #[test]
    fn run_to_position_respects_budget() {
        let (mut drive, _device, _clock) = drive_with_tick(200);
        drive.run_to_position(500, Duration::from_secs(30)).unwrap();
        assert_eq!(drive.current_position(), 500);
    }

    #[test]
    fn halt_cancels_pending_motion() {
        let (mut drive, _device, _clock) = drive_with_tick(200);
        drive.move_to(10_000);
        for _ in 0..50 {
            drive.run().unwrap();
        }
        drive.halt();
        assert_eq!(drive.distance_to_go(), 0);
        assert_eq!(drive.speed(), 0.0);
        assert!(!drive.run().unwrap());
    }

    #[test]
    fn rebase_clears_motion_state() {
        let (mut drive, _device, _clock) = drive_with_tick(200);
        drive.set_speed(800.0);
        drive.run_speed().unwrap();
        drive.set_current_position(0);
        assert_eq!(drive.current_position(), 0);
        assert_eq!(drive.target_position(), 0);
        assert_eq!(drive.speed(), 0.0);
        assert!(!drive.run_speed().unwrap());
    }

    #[test]
    fn step_errors_surface_as_hardware_reports() {
        struct FailingDevice;
        impl StepDevice for FailingDevice {
            fn step_forward(
                &mut self,
            ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
                Err("driver fault: open coil".into())
            }
            fn step_backward(
                &mut self,
            ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
                Err("driver fault: open coil".into())
            }
        }

        let clock = SimClock::with_auto_tick(Duration::from_micros(1000));
        let mut drive = MotorDrive::new(FailingDevice, Arc::new(clock));
        drive.set_max_speed(1600.0);
        drive.set_speed(1000.0);
        let mut saw_err = false;
        for _ in 0..5 {
            if let Err(e) = drive.run_speed() {
                saw_err = true;
                assert!(format!("{e:#}").contains("fault"));
                break;
            }
        }
        assert!(saw_err);
    }
}
