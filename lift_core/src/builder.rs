//! Type-state builder for `Lift`.
//!
//! The builder enforces at compile time that the step device, the sensor port
//! and the control panel are provided before `build()` is available.
//! `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use lift_config::MachineCfg;
use lift_traits::clock::{Clock, MonotonicClock};
use lift_traits::{ControlPanel, SensorPort, SettingsStore, StepDevice};

use crate::controller::Controller;
use crate::error::{BuildError, Result};
use crate::menu::MenuPage;
use crate::settings::LiftSettings;
use crate::state::LiftState;
use crate::status::LiftStatus;

// ── Public dynamic-dispatch wrapper ──────────────────────────────────────────

/// Boxed controller with every port behind dynamic dispatch; what the CLI and
/// most integrations want.
pub struct Lift {
    pub(crate) inner: Controller<
        Box<dyn StepDevice>,
        Box<dyn SensorPort>,
        Box<dyn ControlPanel>,
        Box<dyn SettingsStore>,
    >,
}

impl core::fmt::Debug for Lift {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Lift")
            .field("state", &self.inner.state())
            .field("position_steps", &self.inner.position_steps())
            .field("slow_mode", &self.inner.slow_mode())
            .finish()
    }
}

impl Lift {
    /// Start building a Lift.
    pub fn builder() -> LiftBuilder<Missing, Missing, Missing> {
        LiftBuilder::default()
    }

    /// Honor the power-on-toolchange setting. Call once after `build()`.
    pub fn power_on(&mut self) -> Result<()> {
        self.inner.power_on()
    }

    /// One pass of the control loop.
    pub fn tick(&mut self) -> Result<()> {
        self.inner.tick()
    }

    /// Snapshot for rendering and the status stream.
    pub fn status(&mut self) -> Result<LiftStatus> {
        self.inner.status()
    }

    pub fn state(&self) -> LiftState {
        self.inner.state()
    }

    pub fn settings(&self) -> &LiftSettings {
        self.inner.settings()
    }

    pub fn menu_page(&self) -> MenuPage {
        self.inner.menu_page()
    }

    pub fn position_steps(&self) -> i64 {
        self.inner.position_steps()
    }

    pub fn slow_mode(&self) -> bool {
        self.inner.slow_mode()
    }

    pub fn error_label(&self) -> Option<&'static str> {
        self.inner.error_label()
    }

    /// Force a state transition, running the usual exit and entry actions.
    pub fn change_state_to(&mut self, next: LiftState) -> Result<()> {
        self.inner.change_state_to(next)
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Lift`. The machine profile is validated on `build()`.
pub struct LiftBuilder<D, P, B> {
    device: Option<Box<dyn StepDevice>>,
    sensors: Option<Box<dyn SensorPort>>,
    panel: Option<Box<dyn ControlPanel>>,
    store: Option<Box<dyn SettingsStore>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    machine: Option<MachineCfg>,
    _d: PhantomData<D>,
    _p: PhantomData<P>,
    _b: PhantomData<B>,
}

impl Default for LiftBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            device: None,
            sensors: None,
            panel: None,
            store: None,
            clock: None,
            machine: None,
            _d: PhantomData,
            _p: PhantomData,
            _b: PhantomData,
        }
    }
}

fn validate_machine(machine: &MachineCfg) -> Result<()> {
    if machine.steps_per_rev <= 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "steps_per_rev must be > 0",
        )));
    }
    if !(machine.thread_pitch_mm > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "thread_pitch_mm must be > 0",
        )));
    }
    if machine.direction != -1 && machine.direction != 1 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "direction must be -1 or 1",
        )));
    }
    if machine.resolved_max_speed() <= 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "max_speed must be > 0",
        )));
    }
    if machine.resolved_toolchange_speed() <= 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "toolchange_speed must be > 0",
        )));
    }
    if machine.resolved_acceleration() <= 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "acceleration must be > 0",
        )));
    }
    if machine.auto_zero_speed <= 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "auto_zero_speed must be > 0",
        )));
    }
    if machine.workspace_height_mm < 0.0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "workspace_height_mm must be >= 0",
        )));
    }
    Ok(())
}

impl<D, P, B> LiftBuilder<D, P, B> {
    /// Fallible build available in any type-state; returns a detailed error
    /// for missing pieces.
    pub fn try_build(self) -> Result<Lift> {
        let device = self
            .device
            .ok_or_else(|| eyre::Report::new(BuildError::MissingDevice))?;
        let sensors = self
            .sensors
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensors))?;
        let panel = self
            .panel
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPanel))?;

        let machine = self.machine.unwrap_or_default();
        validate_machine(&machine)?;

        let store: Box<dyn SettingsStore> = self
            .store
            .unwrap_or_else(|| Box::new(crate::mocks::MemStore::default()));
        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };

        let inner = Controller::new(device, sensors, panel, store, clock, machine);
        Ok(Lift { inner })
    }
}

/// Chainable setters that do not affect type-state.
impl<D, P, B> LiftBuilder<D, P, B> {
    /// Durable calibration store; defaults to a volatile in-memory store.
    pub fn with_store(mut self, store: impl SettingsStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Deployment machine profile; defaults to the rev A preset.
    pub fn with_machine(mut self, machine: MachineCfg) -> Self {
        self.machine = Some(machine);
        self
    }

    /// Provide a custom clock implementation; defaults to `MonotonicClock`
    /// when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<P, B> LiftBuilder<Missing, P, B> {
    pub fn with_device(self, device: impl StepDevice + 'static) -> LiftBuilder<Set, P, B> {
        LiftBuilder {
            device: Some(Box::new(device)),
            sensors: self.sensors,
            panel: self.panel,
            store: self.store,
            clock: self.clock,
            machine: self.machine,
            _d: PhantomData,
            _p: PhantomData,
            _b: PhantomData,
        }
    }
}

impl<D, B> LiftBuilder<D, Missing, B> {
    pub fn with_sensors(self, sensors: impl SensorPort + 'static) -> LiftBuilder<D, Set, B> {
        LiftBuilder {
            device: self.device,
            sensors: Some(Box::new(sensors)),
            panel: self.panel,
            store: self.store,
            clock: self.clock,
            machine: self.machine,
            _d: PhantomData,
            _p: PhantomData,
            _b: PhantomData,
        }
    }
}

impl<D, P> LiftBuilder<D, P, Missing> {
    pub fn with_panel(self, panel: impl ControlPanel + 'static) -> LiftBuilder<D, P, Set> {
        LiftBuilder {
            device: self.device,
            sensors: self.sensors,
            panel: Some(Box::new(panel)),
            store: self.store,
            clock: self.clock,
            machine: self.machine,
            _d: PhantomData,
            _p: PhantomData,
            _b: PhantomData,
        }
    }
}

impl LiftBuilder<Set, Set, Set> {
    /// Validate and build the Lift. Only available once the device, sensors
    /// and panel are set.
    pub fn build(self) -> Result<Lift> {
        self.try_build()
    }
}
