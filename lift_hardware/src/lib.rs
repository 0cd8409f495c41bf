//! Hardware backends for the router-lift controller: a simulated bench for
//! development and tests, and a Raspberry Pi GPIO backend behind the
//! `hardware` feature.

pub mod error;
pub mod util;

#[cfg(feature = "hardware")]
pub mod gpio;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lift_traits::{ControlPanel, InputSnapshot, SensorPort, StepDevice};

use crate::error::HwError;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Trip zones of the simulated column, in raw steps. Both switches sit at the
/// raw-low end of travel, the way the real column is wired: driving the step
/// counter down eventually closes the probe, then the end stop.
#[derive(Debug, Clone, Copy)]
pub struct SimBenchCfg {
    /// At or below this position the end-stop circuit closes.
    pub end_stop_trip: i64,
    /// At or below this position the tool-length probe contact closes.
    pub probe_trip: i64,
    /// The tool-length probe plug is inserted.
    pub probe_plugged: bool,
}

impl Default for SimBenchCfg {
    fn default() -> Self {
        Self {
            end_stop_trip: -900,
            probe_trip: -500,
            probe_plugged: false,
        }
    }
}

/// Simulated column: one shared step counter that the stepper writes and the
/// sensors read. Handles are cheap clones over the same state, so the
/// controller can own the ports while a test (or the self-check) keeps the
/// bench to inspect and poke.
#[derive(Default)]
pub struct SimulatedBench {
    pos: Rc<Cell<i64>>,
    cfg: Rc<Cell<SimBenchCfg>>,
    fault: Rc<RefCell<Option<String>>>,
}

impl SimulatedBench {
    #[must_use]
    pub fn new(cfg: SimBenchCfg) -> Self {
        Self {
            pos: Rc::new(Cell::new(0)),
            cfg: Rc::new(Cell::new(cfg)),
            fault: Rc::new(RefCell::new(None)),
        }
    }

    #[must_use]
    pub fn stepper(&self) -> SimulatedStepper {
        SimulatedStepper {
            pos: self.pos.clone(),
            fault: self.fault.clone(),
        }
    }

    #[must_use]
    pub fn sensors(&self) -> SimulatedSensors {
        SimulatedSensors {
            pos: self.pos.clone(),
            cfg: self.cfg.clone(),
        }
    }

    #[must_use]
    pub fn position(&self) -> i64 {
        self.pos.get()
    }

    pub fn set_position(&self, steps: i64) {
        self.pos.set(steps);
    }

    pub fn set_cfg(&self, cfg: SimBenchCfg) {
        self.cfg.set(cfg);
    }

    /// Make every following step pulse fail, as a latched driver fault would.
    pub fn inject_fault(&self, msg: &str) {
        *self.fault.borrow_mut() = Some(msg.to_owned());
    }

    pub fn clear_fault(&self) {
        *self.fault.borrow_mut() = None;
    }
}

/// Simulated stepper drive handle.
pub struct SimulatedStepper {
    pos: Rc<Cell<i64>>,
    fault: Rc<RefCell<Option<String>>>,
}

impl SimulatedStepper {
    fn check_fault(&self) -> Result<(), BoxedError> {
        if let Some(msg) = self.fault.borrow().as_ref() {
            return Err(Box::new(HwError::Fault(msg.clone())));
        }
        Ok(())
    }
}

impl StepDevice for SimulatedStepper {
    fn step_forward(&mut self) -> Result<(), BoxedError> {
        self.check_fault()?;
        self.pos.set(self.pos.get() + 1);
        Ok(())
    }

    fn step_backward(&mut self) -> Result<(), BoxedError> {
        self.check_fault()?;
        self.pos.set(self.pos.get() - 1);
        Ok(())
    }
}

/// Simulated sensor port handle. Raw circuit levels: an unplugged probe reads
/// open no matter where the carriage sits.
pub struct SimulatedSensors {
    pos: Rc<Cell<i64>>,
    cfg: Rc<Cell<SimBenchCfg>>,
}

impl SensorPort for SimulatedSensors {
    fn end_stop_closed(&mut self) -> Result<bool, BoxedError> {
        Ok(self.pos.get() <= self.cfg.get().end_stop_trip)
    }

    fn tool_length_closed(&mut self) -> Result<bool, BoxedError> {
        let cfg = self.cfg.get();
        Ok(cfg.probe_plugged && self.pos.get() <= cfg.probe_trip)
    }

    fn tool_length_enable_closed(&mut self) -> Result<bool, BoxedError> {
        Ok(self.cfg.get().probe_plugged)
    }
}

/// Panel with nothing attached; headless runs idle until interrupted.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedPanel;

impl ControlPanel for SimulatedPanel {
    fn poll(&mut self) -> Result<InputSnapshot, BoxedError> {
        Ok(InputSnapshot::default())
    }

    fn up_held(&mut self) -> Result<bool, BoxedError> {
        Ok(false)
    }

    fn down_held(&mut self) -> Result<bool, BoxedError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepper_moves_the_shared_counter() {
        let bench = SimulatedBench::new(SimBenchCfg::default());
        let mut stepper = bench.stepper();
        for _ in 0..3 {
            stepper.step_forward().unwrap();
        }
        stepper.step_backward().unwrap();
        assert_eq!(bench.position(), 2);
    }

    #[test]
    fn sensors_trip_at_their_zones() {
        let bench = SimulatedBench::new(SimBenchCfg {
            end_stop_trip: -10,
            probe_trip: -5,
            probe_plugged: true,
        });
        let mut sensors = bench.sensors();

        assert!(!sensors.end_stop_closed().unwrap());
        assert!(!sensors.tool_length_closed().unwrap());
        assert!(sensors.tool_length_enable_closed().unwrap());

        bench.set_position(-5);
        assert!(!sensors.end_stop_closed().unwrap());
        assert!(sensors.tool_length_closed().unwrap());

        bench.set_position(-10);
        assert!(sensors.end_stop_closed().unwrap());
    }

    #[test]
    fn unplugged_probe_reads_open() {
        let bench = SimulatedBench::new(SimBenchCfg {
            probe_plugged: false,
            ..SimBenchCfg::default()
        });
        let mut sensors = bench.sensors();
        bench.set_position(-100_000);
        assert!(!sensors.tool_length_enable_closed().unwrap());
        assert!(!sensors.tool_length_closed().unwrap());
    }

    #[test]
    fn injected_fault_fails_every_pulse() {
        let bench = SimulatedBench::new(SimBenchCfg::default());
        let mut stepper = bench.stepper();
        bench.inject_fault("overtemp");

        let err = stepper.step_forward().expect_err("fault expected");
        match err.downcast_ref::<HwError>() {
            Some(HwError::Fault(msg)) => assert_eq!(msg, "overtemp"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(bench.position(), 0);

        bench.clear_fault();
        stepper.step_backward().unwrap();
        assert_eq!(bench.position(), -1);
    }
}
