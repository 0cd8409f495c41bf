//! The lift control loop.
//!
//! `Controller` aggregates everything the firmware used to keep in scattered
//! globals: the drive, the sensor views, the travel envelope, the live
//! settings, the editor position and the current machine state. One `tick`
//! equals one pass of the firmware main loop; the caller owns the cadence.
//!
//! Input edges arrive as `InputSnapshot`s and latch in `pending` until the
//! state that cares about them consumes them, so a press made during a
//! parking move still fires once the machine is back in jog mode.

use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use lift_config::MachineCfg;
use lift_traits::clock::Clock;
use lift_traits::{ControlPanel, InputSnapshot, SensorPort, SettingsStore, StepDevice};

use crate::envelope::{Envelope, Motion};
use crate::error::{ERROR_AUTO_ZERO, ERROR_END_STOP, Result};
use crate::hw_error::map_hw_error;
use crate::menu::{Menu, MenuPage};
use crate::motor::MotorDrive;
use crate::sensors::Sensors;
use crate::settings::LiftSettings;
use crate::state::LiftState;
use crate::status::{LiftStatus, MenuScreen, WorkspaceStatus};
use crate::util::MILLIS_PER_SEC;

/// How far a recovery retreat may travel before the sensor is declared stuck.
pub const RECOVERY_TOLERANCE_MM: f32 = 3.0;
/// Extra clearance steps after a sensor releases.
pub const RECOVERY_BACK_OFF_STEPS: i64 = 30;
/// Recovery retreats at this fraction of the maximum speed.
const RECOVERY_SPEED_FACTOR: f32 = 0.25;
/// Clock-time cap on each recovery phase; a drive that cannot clear a sensor
/// in this window is not going to.
const RECOVERY_TIME_BUDGET: Duration = Duration::from_secs(5);
/// Cap on a single held-button jog so a stuck button cannot wedge the loop.
const JOG_TIME_CAP: Duration = Duration::from_secs(30);
/// How long the reset confirmation stays on screen.
const RESET_SHOW_MS: u64 = MILLIS_PER_SEC;

#[derive(Debug, Clone, Copy)]
enum RecoverySensor {
    EndStop,
    ToolLength,
}

pub struct Controller<D: StepDevice, P: SensorPort, B: ControlPanel, S: SettingsStore> {
    motor: MotorDrive<D>,
    sensors: Sensors<P>,
    panel: B,
    store: S,
    clock: Arc<dyn Clock + Send + Sync>,
    defaults: MachineCfg,
    settings: LiftSettings,

    state: LiftState,
    menu: Menu,
    envelope: Envelope,
    /// Slow jog mode: encoder detents and jog speed run on the fine grid.
    slow_mode: bool,
    /// Sub-grid offset captured at the last mode switch, keeping fast moves
    /// aligned with positions reached in slow mode.
    slow_grid_offset: i64,
    /// Edges collected but not yet consumed by a state.
    pending: InputSnapshot,
    message: Option<&'static str>,
}

impl<D, P, B, S> Controller<D, P, B, S>
where
    D: StepDevice,
    P: SensorPort,
    B: ControlPanel,
    S: SettingsStore,
{
    /// Load settings, apply the motion limits, and zero the position.
    /// The machine starts in jog mode; call `power_on` afterwards to honor
    /// the power-on-toolchange setting.
    pub fn new(
        device: D,
        port: P,
        panel: B,
        mut store: S,
        clock: Arc<dyn Clock + Send + Sync>,
        defaults: MachineCfg,
    ) -> Self {
        let settings = LiftSettings::load(&mut store, &defaults);
        tracing::info!(
            steps_per_rev = settings.steps_per_revolution,
            thread_pitch_mm = settings.thread_pitch_mm,
            max_speed = settings.max_speed,
            "settings loaded"
        );
        let mut motor = MotorDrive::new(device, Arc::clone(&clock));
        motor.set_max_speed(settings.max_speed as f32);
        motor.set_acceleration(settings.acceleration as f32);
        motor.set_current_position(0);
        Self {
            motor,
            sensors: Sensors::new(port),
            panel,
            store,
            clock,
            defaults,
            settings,
            state: LiftState::DefaultStart,
            menu: Menu::new(),
            envelope: Envelope::new(),
            slow_mode: false,
            slow_grid_offset: 0,
            pending: InputSnapshot::default(),
            message: None,
        }
    }

    /// Start the parking workflow if the deployment asks for it.
    pub fn power_on(&mut self) -> Result<()> {
        if self.settings.power_on_toolchange {
            tracing::info!("power-on toolchange configured, parking for tool change");
            self.change_state_to(LiftState::GotoToolchange)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> LiftState {
        self.state
    }

    #[must_use]
    pub fn settings(&self) -> &LiftSettings {
        &self.settings
    }

    #[must_use]
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    #[must_use]
    pub fn menu_page(&self) -> MenuPage {
        self.menu.page()
    }

    /// Raw step position straight from the drive.
    #[must_use]
    pub fn position_steps(&self) -> i64 {
        self.motor.current_position()
    }

    #[must_use]
    pub fn target_steps(&self) -> i64 {
        self.motor.target_position()
    }

    #[must_use]
    pub fn slow_mode(&self) -> bool {
        self.slow_mode
    }

    /// Label of the latched fault, while in the error state.
    #[must_use]
    pub fn error_label(&self) -> Option<&'static str> {
        self.message
    }

    /// One pass of the control loop.
    pub fn tick(&mut self) -> Result<()> {
        let snap = self
            .panel
            .poll()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("polling panel")?;
        self.pending.merge(&snap);

        match self.state {
            LiftState::DefaultStart => self.tick_default(),
            LiftState::GotoToolLength => self.tick_goto_tool_length(),
            LiftState::FinishToolLength => self.tick_finish_tool_length(),
            LiftState::GotoToolchange => self.tick_goto_toolchange(),
            LiftState::FinishToolchange => self.change_state_to(LiftState::DefaultStart),
            LiftState::SettingsMenu => self.tick_settings_menu(),
            LiftState::Reset => self.change_state_to(LiftState::DefaultStart),
            LiftState::Error => self.tick_error(),
        }
    }

    /// Snapshot for the display and the status stream.
    pub fn status(&mut self) -> Result<LiftStatus> {
        let pos = self.motor.current_position();
        let menu = (self.state == LiftState::SettingsMenu).then(|| {
            let page = self.menu.page();
            MenuScreen {
                page,
                title: page.title(),
                value: page.value_text(&self.settings),
            }
        });
        let workspace = self.envelope.workspace().map(|ws| WorkspaceStatus {
            lower_mm: self.settings.position_in_mm(ws.lower),
            upper_mm: self.settings.position_in_mm(ws.upper),
            at_lower: pos == ws.lower,
            at_upper: pos == ws.upper,
        });
        let tool_length_enabled = self.sensors.tool_length_enabled(&self.settings)?;
        Ok(LiftStatus {
            state: self.state,
            position_mm: self.settings.position_in_mm(pos),
            position_steps: pos,
            slow_mode: self.slow_mode,
            target_height_mm: self.envelope.target().map(|t| t.height_mm),
            workspace,
            tool_length_enabled,
            menu,
            message: if self.state == LiftState::Error {
                self.message.map(str::to_owned)
            } else {
                None
            },
        })
    }

    /// Run the exit action of the current state, then the entry action of
    /// `next`; the state only changes when both succeed. Entry actions that
    /// detect a failed recovery latch the error state themselves.
    pub fn change_state_to(&mut self, next: LiftState) -> Result<()> {
        if self.run_state_exit(self.state)? && self.run_state_entry(next)? {
            self.state = next;
        }
        Ok(())
    }

    fn tick_default(&mut self) -> Result<()> {
        // A pressed end-stop is cleared before anything else may move.
        if self.sensors.end_stop_triggered(&self.settings)? && !self.free_end_stop()? {
            self.error_with(ERROR_END_STOP);
            return Ok(());
        }

        let detents = self.take_detents();
        if detents != 0 {
            let pos = self.motor.current_position();
            let rel = if self.slow_mode {
                // Land on a multiple of the slow grid.
                detents * self.settings.steps_slow * self.settings.direction
                    - pos % self.settings.steps_slow
            } else {
                // Land on the fast grid, shifted by the offset captured at
                // the last mode switch.
                detents * self.settings.steps_fast * self.settings.direction
                    - pos % self.settings.steps_fast
                    + self.slow_grid_offset
            };
            self.motor.move_by(rel);
            tracing::debug!(target = self.motor.target_position(), "encoder move");
        }

        if self.consume_goto_bottom_press() {
            if let Some(ws) = self.envelope.workspace() {
                self.motor.move_to(ws.upper);
            }
        }

        if self.consume_set_speed_hold() {
            let pos = self.motor.current_position();
            let height = self.settings.position_in_mm(pos);
            self.envelope.toggle_target(pos, height);
        }

        if self.up_held()? {
            self.motor
                .set_speed((self.settings.max_speed * self.settings.direction) as f32);
            self.jog_while_held(JogDirection::Up)?;
            self.motor.halt();
        }

        if self.down_held()? {
            self.motor
                .set_speed((-self.settings.max_speed * self.settings.direction) as f32);
            self.jog_while_held(JogDirection::Down)?;
            self.motor.halt();
        }

        if self.consume_set_speed_press() {
            self.slow_mode = !self.slow_mode;
            self.slow_grid_offset = self.motor.target_position() % self.settings.steps_fast;
            let shift = u32::from(self.slow_mode);
            self.motor
                .set_acceleration((self.settings.acceleration >> shift) as f32);
            self.motor
                .set_max_speed((self.settings.max_speed >> shift) as f32);
            tracing::debug!(slow = self.slow_mode, "jog mode toggled");
        }

        // Advance any pending encoder or go-to-bottom move.
        self.move_motor_accelerate()?;

        if self.consume_toolchange_press() {
            self.change_state_to(LiftState::GotoToolchange)?;
        } else if self.consume_set_zero_press() {
            if self.sensors.tool_length_enabled(&self.settings)? {
                self.change_state_to(LiftState::GotoToolLength)?;
            } else {
                self.set_zero();
            }
        } else if self.consume_set_zero_hold() {
            self.change_state_to(LiftState::SettingsMenu)?;
        }
        Ok(())
    }

    fn tick_goto_tool_length(&mut self) -> Result<()> {
        if !self.move_motor_constant()? {
            self.error_with(ERROR_AUTO_ZERO);
        } else if self.sensors.tool_length_triggered(&self.settings)? {
            self.change_state_to(LiftState::FinishToolLength)?;
        }
        Ok(())
    }

    fn tick_finish_tool_length(&mut self) -> Result<()> {
        if self.motor.at_target() {
            self.set_zero();
            self.change_state_to(LiftState::DefaultStart)?;
        } else if !self.move_motor_accelerate()? {
            self.error_with(ERROR_AUTO_ZERO);
        }
        Ok(())
    }

    fn tick_goto_toolchange(&mut self) -> Result<()> {
        // Block results do not matter here; the end-stop is the destination.
        self.move_motor_constant()?;

        if self.sensors.end_stop_triggered(&self.settings)? {
            self.change_state_to(LiftState::FinishToolchange)?;
        } else if self.consume_toolchange_press() {
            self.change_state_to(LiftState::DefaultStart)?;
        }
        Ok(())
    }

    fn tick_settings_menu(&mut self) -> Result<()> {
        if self.consume_toolchange_press() {
            self.menu.back();
        } else if self.consume_set_zero_press() {
            self.menu.forward();
        }

        let detents = self.take_detents();
        if detents != 0 {
            if let Err(e) =
                self.menu
                    .apply(&mut self.settings, &mut self.store, &self.defaults, detents)
            {
                // The live value stands; only the write-back failed.
                tracing::warn!(error = %e, page = ?self.menu.page(), "persisting settings edit failed");
            }
        }

        if self.consume_set_zero_hold() {
            self.change_state_to(LiftState::DefaultStart)?;
        } else if self.consume_goto_bottom_hold() {
            self.change_state_to(LiftState::Reset)?;
        }
        Ok(())
    }

    fn tick_error(&mut self) -> Result<()> {
        self.motor.halt();
        if self.consume_set_zero_hold() {
            self.change_state_to(LiftState::SettingsMenu)?;
        }
        Ok(())
    }

    fn run_state_entry(&mut self, state: LiftState) -> Result<bool> {
        match state {
            LiftState::GotoToolchange => {
                tracing::debug!("entry goto_toolchange");
                self.envelope.deactivate_target();
                self.envelope.deactivate_workspace();
                self.motor
                    .set_speed((self.settings.max_speed * self.settings.direction) as f32);
                Ok(true)
            }
            LiftState::FinishToolchange => {
                tracing::debug!("entry finish_toolchange");
                if !self.free_end_stop()? {
                    self.error_with(ERROR_END_STOP);
                    return Ok(false);
                }
                let pos = self.motor.current_position();
                let span = self.settings.steps_for_mm(self.settings.workspace_height_mm);
                self.envelope.activate_workspace(pos, span);
                tracing::info!(lower = pos, upper = pos + span, "workspace armed");
                Ok(true)
            }
            LiftState::GotoToolLength => {
                tracing::debug!("entry goto_tool_length");
                self.envelope.deactivate_target();
                self.motor
                    .set_speed((self.settings.auto_zero_speed * self.settings.direction) as f32);
                Ok(true)
            }
            LiftState::FinishToolLength => {
                tracing::debug!("entry finish_tool_length");
                if !self.free_tool_length()? {
                    self.error_with(ERROR_AUTO_ZERO);
                    return Ok(false);
                }
                // Aim at the zero plane: the probe sits tool_length_height
                // above it.
                let rel = (-self.settings.tool_length_height_mm / self.settings.mm_per_step()
                    * self.settings.direction as f32) as i64;
                self.motor.move_by(rel);
                Ok(true)
            }
            LiftState::Reset => {
                self.reset_settings_to_defaults();
                Ok(true)
            }
            // The editor resumes at its previous page.
            LiftState::DefaultStart | LiftState::SettingsMenu | LiftState::Error => Ok(true),
        }
    }

    fn run_state_exit(&mut self, state: LiftState) -> Result<bool> {
        match state {
            LiftState::GotoToolchange | LiftState::GotoToolLength | LiftState::FinishToolLength => {
                tracing::debug!(state = %state, "exit halts motor");
                self.motor.halt();
                Ok(true)
            }
            LiftState::Reset => {
                // Leave the confirmation on screen long enough to read.
                self.clock.sleep(Duration::from_millis(RESET_SHOW_MS));
                Ok(true)
            }
            LiftState::DefaultStart
            | LiftState::FinishToolchange
            | LiftState::SettingsMenu
            | LiftState::Error => Ok(true),
        }
    }

    fn error_with(&mut self, label: &'static str) {
        tracing::error!(label, "entering error state");
        self.message = Some(label);
        self.state = LiftState::Error;
    }

    /// Zero the step counter in place, shifting the workspace bounds with it.
    fn set_zero(&mut self) {
        self.envelope.deactivate_target();
        self.envelope.rebase(self.motor.current_position());
        self.motor.set_current_position(0);
        tracing::info!("position zeroed");
    }

    fn reset_settings_to_defaults(&mut self) {
        tracing::info!("restoring factory settings");
        match LiftSettings::reset(&mut self.store, &self.defaults) {
            Ok(s) => self.settings = s,
            Err(e) => {
                tracing::warn!(error = %e, "clearing settings store failed");
                self.settings = LiftSettings::load(&mut self.store, &self.defaults);
            }
        }
    }

    /// Back a triggered sensor off until it releases, then retreat a fixed
    /// clearance. Travel and time are both capped; `Ok(false)` means the
    /// sensor would not release within tolerance.
    fn free_sensor(&mut self, which: RecoverySensor) -> Result<bool> {
        let start = self.motor.current_position();
        let max_travel = self.settings.steps_for_mm(RECOVERY_TOLERANCE_MM);
        let speed = -(self.settings.max_speed as f32)
            * RECOVERY_SPEED_FACTOR
            * self.settings.direction as f32;
        self.motor.set_speed(speed);
        let began = self.clock.now();
        while self.sensor_triggered(which)? {
            if (self.motor.current_position() - start).abs() > max_travel {
                self.motor.halt();
                return Ok(false);
            }
            if self.clock.now().saturating_duration_since(began) > RECOVERY_TIME_BUDGET {
                tracing::warn!(?which, "sensor recovery ran out of time");
                self.motor.halt();
                return Ok(false);
            }
            self.motor.run_speed()?;
        }
        let back_off =
            self.motor.current_position() - RECOVERY_BACK_OFF_STEPS * self.settings.direction;
        self.motor
            .run_to_position(back_off, RECOVERY_TIME_BUDGET)?;
        self.motor.halt();
        Ok(true)
    }

    fn free_end_stop(&mut self) -> Result<bool> {
        self.free_sensor(RecoverySensor::EndStop)
    }

    fn free_tool_length(&mut self) -> Result<bool> {
        self.free_sensor(RecoverySensor::ToolLength)
    }

    fn sensor_triggered(&mut self, which: RecoverySensor) -> Result<bool> {
        match which {
            RecoverySensor::EndStop => self.sensors.end_stop_triggered(&self.settings),
            RecoverySensor::ToolLength => self.sensors.tool_length_triggered(&self.settings),
        }
    }

    /// End-stop plus envelope check for the intended motion.
    fn motion_permitted(&mut self, motion: Motion) -> Result<bool> {
        if self.sensors.end_stop_triggered(&self.settings)? {
            return Ok(false);
        }
        Ok(self
            .envelope
            .permits(self.motor.current_position(), motion))
    }

    /// One constant-speed step if the guard allows it; halts on denial.
    fn move_motor_constant(&mut self) -> Result<bool> {
        let motion = Motion::Constant {
            speed: self.motor.speed(),
        };
        if self.motion_permitted(motion)? {
            self.motor.run_speed()?;
            Ok(true)
        } else {
            self.motor.halt();
            Ok(false)
        }
    }

    /// One ramped step toward the pending target if the guard allows it;
    /// halts on denial.
    fn move_motor_accelerate(&mut self) -> Result<bool> {
        let motion = Motion::Ramped {
            target: self.motor.target_position(),
        };
        if self.motion_permitted(motion)? {
            self.motor.run()?;
            Ok(true)
        } else {
            self.motor.halt();
            Ok(false)
        }
    }

    fn jog_while_held(&mut self, side: JogDirection) -> Result<()> {
        let start = self.clock.now();
        loop {
            let held = match side {
                JogDirection::Up => self.up_held()?,
                JogDirection::Down => self.down_held()?,
            };
            if !held {
                break;
            }
            self.move_motor_constant()?;
            if self.clock.now().saturating_duration_since(start) > JOG_TIME_CAP {
                tracing::warn!(?side, "jog held past cap, halting");
                break;
            }
        }
        Ok(())
    }

    fn up_held(&mut self) -> Result<bool> {
        self.panel
            .up_held()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading up button")
    }

    fn down_held(&mut self) -> Result<bool> {
        self.panel
            .down_held()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading down button")
    }

    fn take_detents(&mut self) -> i64 {
        std::mem::take(&mut self.pending.encoder_delta)
    }

    fn consume_toolchange_press(&mut self) -> bool {
        let v = std::mem::take(&mut self.pending.toolchange_press);
        if v {
            tracing::trace!("toolchange press");
        }
        v
    }

    fn consume_goto_bottom_press(&mut self) -> bool {
        let v = std::mem::take(&mut self.pending.goto_bottom_press);
        if v {
            tracing::trace!("goto_bottom press");
        }
        v
    }

    fn consume_goto_bottom_hold(&mut self) -> bool {
        let v = std::mem::take(&mut self.pending.goto_bottom_hold);
        if v {
            tracing::trace!("goto_bottom hold");
        }
        v
    }

    fn consume_set_zero_press(&mut self) -> bool {
        let v = std::mem::take(&mut self.pending.set_zero_press);
        if v {
            tracing::trace!("set_zero press");
        }
        v
    }

    fn consume_set_zero_hold(&mut self) -> bool {
        let v = std::mem::take(&mut self.pending.set_zero_hold);
        if v {
            tracing::trace!("set_zero hold");
        }
        v
    }

    fn consume_set_speed_press(&mut self) -> bool {
        let v = std::mem::take(&mut self.pending.set_speed_press);
        if v {
            tracing::trace!("set_speed press");
        }
        v
    }

    fn consume_set_speed_hold(&mut self) -> bool {
        let v = std::mem::take(&mut self.pending.set_speed_hold);
        if v {
            tracing::trace!("set_speed hold");
        }
        v
    }
}

#[derive(Debug, Clone, Copy)]
enum JogDirection {
    Up,
    Down,
}
