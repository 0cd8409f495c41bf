//! End-to-end state machine scenarios on a simulated carriage.
//!
//! The rig couples the step device and the sensor bench through one shared
//! position, so sensors trip where the mechanics put the carriage. Rev A
//! geometry applies: direction is -1, meaning raw-negative travel is "up"
//! toward the end stop and the tool-length probe.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lift_config::MachineCfg;
use lift_core::mocks::MemStore;
use lift_core::{Controller, LiftState, TargetLock, Workspace, ERROR_END_STOP};
use lift_traits::clock::SimClock;
use lift_traits::{ControlPanel, InputSnapshot, SensorPort, StepDevice};

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Carriage position shared by the step device and the sensor bench.
#[derive(Debug, Default, Clone)]
struct Carriage {
    steps: Arc<AtomicI64>,
}

impl Carriage {
    fn position(&self) -> i64 {
        self.steps.load(Ordering::SeqCst)
    }
}

struct RigDevice(Carriage);

impl StepDevice for RigDevice {
    fn step_forward(&mut self) -> Result<(), BoxedError> {
        self.0.steps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn step_backward(&mut self) -> Result<(), BoxedError> {
        self.0.steps.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Trip thresholds in raw steps. A sensor reads closed while the carriage
/// sits at or below its threshold; `None` keeps it open everywhere.
#[derive(Debug, Default)]
struct Zones {
    end_stop_at: Option<i64>,
    probe_at: Option<i64>,
    probe_plugged: bool,
}

#[derive(Debug, Clone)]
struct RigSensors {
    carriage: Carriage,
    zones: Arc<Mutex<Zones>>,
}

impl RigSensors {
    fn new(carriage: Carriage) -> Self {
        Self {
            carriage,
            zones: Arc::new(Mutex::new(Zones::default())),
        }
    }

    fn set_end_stop_at(&self, at: Option<i64>) {
        self.zones.lock().unwrap().end_stop_at = at;
    }

    fn set_probe_at(&self, at: Option<i64>) {
        self.zones.lock().unwrap().probe_at = at;
    }

    fn plug_probe(&self, plugged: bool) {
        self.zones.lock().unwrap().probe_plugged = plugged;
    }

    fn closed_at(&self, threshold: Option<i64>) -> bool {
        threshold.is_some_and(|at| self.carriage.position() <= at)
    }
}

impl SensorPort for RigSensors {
    fn end_stop_closed(&mut self) -> Result<bool, BoxedError> {
        let at = self.zones.lock().unwrap().end_stop_at;
        Ok(self.closed_at(at))
    }

    fn tool_length_closed(&mut self) -> Result<bool, BoxedError> {
        let at = self.zones.lock().unwrap().probe_at;
        Ok(self.closed_at(at))
    }

    fn tool_length_enable_closed(&mut self) -> Result<bool, BoxedError> {
        Ok(self.zones.lock().unwrap().probe_plugged)
    }
}

/// Panel whose jog buttons read held for a fixed number of polls and then
/// release, like an operator letting go mid-tick.
#[derive(Debug, Default, Clone)]
struct DecayPanel {
    inner: Arc<Mutex<DecayState>>,
}

#[derive(Debug, Default)]
struct DecayState {
    queue: VecDeque<InputSnapshot>,
    up_reads: u32,
    down_reads: u32,
}

impl DecayPanel {
    fn push(&self, snap: InputSnapshot) {
        self.inner.lock().unwrap().queue.push_back(snap);
    }

    fn hold_up(&self, reads: u32) {
        self.inner.lock().unwrap().up_reads = reads;
    }

    fn hold_down(&self, reads: u32) {
        self.inner.lock().unwrap().down_reads = reads;
    }
}

impl ControlPanel for DecayPanel {
    fn poll(&mut self) -> Result<InputSnapshot, BoxedError> {
        Ok(self.inner.lock().unwrap().queue.pop_front().unwrap_or_default())
    }

    fn up_held(&mut self) -> Result<bool, BoxedError> {
        let mut state = self.inner.lock().unwrap();
        if state.up_reads > 0 {
            state.up_reads -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn down_held(&mut self) -> Result<bool, BoxedError> {
        let mut state = self.inner.lock().unwrap();
        if state.down_reads > 0 {
            state.down_reads -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

type Rig = Controller<RigDevice, RigSensors, DecayPanel, MemStore>;

/// Rev A defaults with a 2 mm probe height, so the auto-zero retraction is
/// exactly 400 steps at 0.005 mm/step.
fn test_machine() -> MachineCfg {
    MachineCfg {
        tool_length_height_mm: 2.0,
        ..MachineCfg::rev_a()
    }
}

fn rig(machine: MachineCfg) -> (Rig, Carriage, RigSensors, DecayPanel) {
    let carriage = Carriage::default();
    let sensors = RigSensors::new(carriage.clone());
    let panel = DecayPanel::default();
    let clock = SimClock::with_auto_tick(Duration::from_micros(200));
    let lift = Controller::new(
        RigDevice(carriage.clone()),
        sensors.clone(),
        panel.clone(),
        MemStore::new(),
        Arc::new(clock),
        machine,
    );
    (lift, carriage, sensors, panel)
}

fn run_until(lift: &mut Rig, cap: u32, done: impl Fn(&Rig) -> bool) {
    for _ in 0..cap {
        lift.tick().expect("tick");
        if done(lift) {
            return;
        }
    }
    panic!("no settle within {cap} ticks, state {:?}", lift.state());
}

#[test]
fn fresh_controller_starts_in_jog_mode() {
    let (mut lift, _carriage, _sensors, _panel) = rig(test_machine());

    assert_eq!(lift.state(), LiftState::DefaultStart);
    assert_eq!(lift.position_steps(), 0);
    assert!(!lift.slow_mode());
    assert!(lift.envelope().workspace().is_none());
    assert!(lift.envelope().target().is_none());

    let status = lift.status().expect("status");
    assert_eq!(status.position_steps, 0);
    assert!(status.menu.is_none());
    assert!(status.message.is_none());
    assert!(!status.tool_length_enabled);
}

#[test]
fn toolchange_cycle_parks_off_the_end_stop_and_arms_the_workspace() {
    let (mut lift, carriage, sensors, panel) = rig(test_machine());
    sensors.set_end_stop_at(Some(-900));

    panel.push(InputSnapshot {
        toolchange_press: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(lift.state(), LiftState::GotoToolchange);

    run_until(&mut lift, 20_000, |l| l.state() == LiftState::DefaultStart);

    // Tripped at -900, released one step off, then backed away thirty more.
    assert_eq!(carriage.position(), -869);
    assert_eq!(lift.position_steps(), -869);
    let ws = lift.envelope().workspace().copied().expect("workspace armed");
    assert_eq!(
        ws,
        Workspace {
            lower: -869,
            upper: -869 + 15_000,
        }
    );

    let status = lift.status().expect("status");
    // Raw negative steps read as a positive height on the display side.
    assert!(status.position_mm > 4.3 && status.position_mm < 4.4);
    let ws_status = status.workspace.expect("workspace status");
    assert!(ws_status.at_lower);
    assert!(!ws_status.at_upper);
}

#[test]
fn toolchange_cancel_returns_to_jog_without_arming() {
    let (mut lift, carriage, sensors, panel) = rig(test_machine());
    sensors.set_end_stop_at(Some(-100_000));

    panel.push(InputSnapshot {
        toolchange_press: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    run_until(&mut lift, 500, |l| l.position_steps() < -50);
    assert_eq!(lift.state(), LiftState::GotoToolchange);

    panel.push(InputSnapshot {
        toolchange_press: true,
        ..InputSnapshot::default()
    });
    run_until(&mut lift, 10, |l| l.state() == LiftState::DefaultStart);
    assert!(lift.envelope().workspace().is_none());

    let parked = carriage.position();
    for _ in 0..50 {
        lift.tick().expect("tick");
    }
    assert_eq!(carriage.position(), parked, "motor kept stepping after cancel");
}

#[test]
fn power_on_toolchange_runs_the_parking_cycle() {
    let machine = MachineCfg {
        power_on_toolchange: true,
        ..test_machine()
    };
    let (mut lift, carriage, sensors, _panel) = rig(machine);
    sensors.set_end_stop_at(Some(-300));

    lift.power_on().expect("power on");
    assert_eq!(lift.state(), LiftState::GotoToolchange);

    run_until(&mut lift, 20_000, |l| l.state() == LiftState::DefaultStart);
    assert_eq!(carriage.position(), -269);
    assert!(lift.envelope().workspace().is_some());
}

#[test]
fn power_on_stays_put_without_the_flag() {
    let (mut lift, carriage, _sensors, _panel) = rig(test_machine());
    lift.power_on().expect("power on");
    assert_eq!(lift.state(), LiftState::DefaultStart);
    assert_eq!(carriage.position(), 0);
}

#[test]
fn stuck_end_stop_latches_the_error_state() {
    let (mut lift, carriage, sensors, _panel) = rig(test_machine());
    // Closed at every position: the recovery retreat can never release it.
    sensors.set_end_stop_at(Some(i64::MAX));

    lift.tick().expect("tick");
    assert_eq!(lift.state(), LiftState::Error);
    assert_eq!(lift.error_label(), Some(ERROR_END_STOP));
    // Gave up one step past the 3 mm travel allowance.
    assert_eq!(carriage.position(), 601);

    let status = lift.status().expect("status");
    assert_eq!(status.message.as_deref(), Some(ERROR_END_STOP));
}

#[test]
fn slow_recovery_runs_out_of_time() {
    // A 40 steps/s ceiling retreats at 10 steps/s; 3 mm would take a minute,
    // so the time budget trips long before the travel allowance.
    let machine = MachineCfg {
        max_speed: Some(40),
        ..test_machine()
    };
    let (mut lift, carriage, sensors, _panel) = rig(machine);
    sensors.set_end_stop_at(Some(i64::MAX));

    lift.tick().expect("tick");
    assert_eq!(lift.state(), LiftState::Error);
    assert_eq!(lift.error_label(), Some(ERROR_END_STOP));
    assert!(
        (1..=60).contains(&carriage.position()),
        "expected a short retreat, got {}",
        carriage.position()
    );
}

#[test]
fn error_acknowledges_into_the_menu_and_back_to_jog() {
    let (mut lift, _carriage, sensors, panel) = rig(test_machine());
    sensors.set_end_stop_at(Some(i64::MAX));
    lift.tick().expect("tick");
    assert_eq!(lift.state(), LiftState::Error);

    // Plain ticks keep the fault latched.
    lift.tick().expect("tick");
    assert_eq!(lift.state(), LiftState::Error);

    panel.push(InputSnapshot {
        set_zero_hold: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(lift.state(), LiftState::SettingsMenu);

    sensors.set_end_stop_at(None);
    panel.push(InputSnapshot {
        set_zero_hold: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(lift.state(), LiftState::DefaultStart);
    assert!(lift.status().expect("status").message.is_none());
}

#[test]
fn latched_set_zero_press_rebases_after_parking() {
    let (mut lift, carriage, sensors, panel) = rig(test_machine());
    sensors.set_end_stop_at(Some(-900));

    panel.push(InputSnapshot {
        toolchange_press: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");

    // Pressed mid-park: the edge stays latched until jog mode consumes it.
    panel.push(InputSnapshot {
        set_zero_press: true,
        ..InputSnapshot::default()
    });
    run_until(&mut lift, 20_000, |l| l.state() == LiftState::DefaultStart);

    lift.tick().expect("tick");
    assert_eq!(lift.position_steps(), 0);
    assert_eq!(carriage.position(), -869);
    let ws = lift.envelope().workspace().copied().expect("workspace armed");
    assert_eq!(
        ws,
        Workspace {
            lower: 0,
            upper: 15_000,
        }
    );
}

#[test]
fn set_zero_without_probe_stays_in_jog_mode() {
    let (mut lift, _carriage, _sensors, panel) = rig(test_machine());
    panel.push(InputSnapshot {
        set_zero_press: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(lift.state(), LiftState::DefaultStart);
    assert_eq!(lift.position_steps(), 0);
}

#[test]
fn plugged_probe_turns_set_zero_into_an_auto_zero_cycle() {
    let (mut lift, carriage, sensors, panel) = rig(test_machine());
    sensors.set_probe_at(Some(-500));
    sensors.plug_probe(true);
    assert!(lift.status().expect("status").tool_length_enabled);

    panel.push(InputSnapshot {
        set_zero_press: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(lift.state(), LiftState::GotoToolLength);

    run_until(&mut lift, 30_000, |l| l.state() == LiftState::DefaultStart);

    // Tripped at -500, backed off to -469, then retracted the 2 mm probe
    // height (400 steps) and zeroed there.
    assert_eq!(carriage.position(), -69);
    assert_eq!(lift.position_steps(), 0);
}

#[test]
fn goto_bottom_targets_the_workspace_floor() {
    let (mut lift, _carriage, sensors, panel) = rig(test_machine());
    sensors.set_end_stop_at(Some(-900));
    panel.push(InputSnapshot {
        toolchange_press: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    run_until(&mut lift, 20_000, |l| l.state() == LiftState::DefaultStart);
    let upper = lift.envelope().workspace().expect("workspace armed").upper;

    panel.push(InputSnapshot {
        goto_bottom_press: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(lift.target_steps(), upper);
}

#[test]
fn goto_bottom_is_ignored_without_a_workspace() {
    let (mut lift, _carriage, _sensors, panel) = rig(test_machine());
    panel.push(InputSnapshot {
        goto_bottom_press: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(lift.target_steps(), 0);
}

#[test]
fn encoder_detents_snap_to_the_jog_grids() {
    let (mut lift, _carriage, _sensors, panel) = rig(test_machine());

    panel.push(InputSnapshot {
        set_speed_press: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert!(lift.slow_mode());

    // One slow detent is 0.05 mm: ten steps up (raw negative).
    panel.push(InputSnapshot {
        encoder_delta: 1,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(lift.target_steps(), -10);

    panel.push(InputSnapshot {
        set_speed_press: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert!(!lift.slow_mode());

    // One fast detent is 1 mm, landing on the fast grid shifted by the
    // offset captured at the mode switch.
    panel.push(InputSnapshot {
        encoder_delta: 1,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(lift.target_steps(), -210);
}

#[test]
fn target_lock_blocks_rising_past_the_armed_height() {
    let (mut lift, _carriage, _sensors, panel) = rig(test_machine());

    panel.push(InputSnapshot {
        set_speed_hold: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(
        lift.envelope().target().copied(),
        Some(TargetLock {
            height_mm: 0.0,
            lower_limit: 0,
        })
    );

    // Up (raw negative) crosses the armed height: refused, target snaps back.
    panel.push(InputSnapshot {
        encoder_delta: 1,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(lift.target_steps(), 0);

    // Down stays on the safe side of the lock.
    panel.push(InputSnapshot {
        encoder_delta: -1,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(lift.target_steps(), 200);
}

#[test]
fn target_lock_toggle_disarms() {
    let (mut lift, _carriage, _sensors, panel) = rig(test_machine());

    panel.push(InputSnapshot {
        set_speed_hold: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert!(lift.envelope().target().is_some());

    panel.push(InputSnapshot {
        set_speed_hold: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert!(lift.envelope().target().is_none());

    // With the lock gone the upward detent goes through.
    panel.push(InputSnapshot {
        encoder_delta: 1,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    assert_eq!(lift.target_steps(), -200);
}

#[test]
fn held_buttons_jog_and_release_halts() {
    let (mut lift, carriage, _sensors, panel) = rig(test_machine());

    panel.hold_up(200);
    lift.tick().expect("tick");
    let after_up = carriage.position();
    assert!(after_up < 0, "up jog should move raw negative, got {after_up}");
    assert_eq!(lift.position_steps(), after_up);

    // Released: nothing moves on later ticks.
    for _ in 0..50 {
        lift.tick().expect("tick");
    }
    assert_eq!(carriage.position(), after_up);

    panel.hold_down(200);
    lift.tick().expect("tick");
    assert!(carriage.position() > after_up, "down jog should move raw positive");
}

#[test]
fn jog_respects_the_workspace_edge() {
    let (mut lift, carriage, sensors, panel) = rig(test_machine());
    sensors.set_end_stop_at(Some(-900));
    panel.push(InputSnapshot {
        toolchange_press: true,
        ..InputSnapshot::default()
    });
    lift.tick().expect("tick");
    run_until(&mut lift, 20_000, |l| l.state() == LiftState::DefaultStart);
    assert_eq!(carriage.position(), -869);

    // Parked on the workspace ceiling: jogging further up is refused.
    panel.hold_up(50);
    lift.tick().expect("tick");
    assert_eq!(carriage.position(), -869);

    // Jogging back down into the band works.
    panel.hold_down(200);
    lift.tick().expect("tick");
    assert!(carriage.position() > -869);
}
