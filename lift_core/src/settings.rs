//! Live machine settings backed by a persistent key/value store.
//!
//! Settings are loaded once at startup and written back field by field as the
//! operator edits them. Defaults come from the per-deployment `MachineCfg`;
//! anything the store already holds wins over the default.

use lift_config::MachineCfg;
use lift_traits::SettingsStore;

use crate::util::round_to_hundredths;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Encoder detent travel in slow mode, in millimetres.
pub const ENCODER_SLOW_MM: f32 = 0.05;
/// Encoder detent travel in fast mode, in millimetres.
pub const ENCODER_FAST_MM: f32 = 1.0;

/// Store keys, shared by the loader and the per-field setters.
pub mod key {
    pub const STEPS_PER_REV: &str = "steps_per_rev";
    pub const THREAD_PITCH: &str = "thread_pitch";
    pub const STEPS_SLOW: &str = "steps_slow";
    pub const STEPS_FAST: &str = "steps_fast";
    pub const MOTOR_DIR: &str = "motor_dir";
    pub const MOTOR_SPEED_MAX: &str = "motor_speed_max";
    pub const SPEED_TOOLCHANGE: &str = "speed_toolch";
    pub const MOTOR_ACC: &str = "motor_acc";
    pub const END_STOP_NC: &str = "end_stop_n_c";
    pub const TOOL_LENGTH_NC: &str = "tlsensor_n_c";
    pub const TOOL_LENGTH_ENABLE_NC: &str = "tlsensor_en_n_c";
    pub const TOOL_LENGTH_HEIGHT: &str = "tlsensor_height";
    pub const WORKSPACE_HEIGHT: &str = "ws_height";
    pub const POWER_ON_TOOLCHANGE: &str = "pwr_on_toolch";
    pub const AUTO_ZERO_SPEED: &str = "auto_zero_speed";
}

/// All operator-editable machine parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LiftSettings {
    pub steps_per_revolution: i64,
    pub thread_pitch_mm: f32,
    /// Steps the carriage moves per encoder detent in slow mode.
    pub steps_slow: i64,
    /// Steps the carriage moves per encoder detent in fast mode.
    pub steps_fast: i64,
    /// +1 or -1; applied to every commanded speed and target.
    pub direction: i64,
    pub max_speed: i64,
    pub toolchange_speed: i64,
    pub acceleration: i64,
    pub auto_zero_speed: i64,
    pub end_stop_normally_closed: bool,
    pub tool_length_normally_closed: bool,
    pub tool_length_enable_normally_closed: bool,
    /// Height of the tool-length probe above the table, in millimetres.
    pub tool_length_height_mm: f32,
    pub workspace_height_mm: f32,
    pub power_on_toolchange: bool,
}

impl LiftSettings {
    /// Read every field from `store`, falling back to the deployment defaults.
    pub fn load<S: SettingsStore + ?Sized>(store: &mut S, defaults: &MachineCfg) -> Self {
        Self {
            steps_per_revolution: store.get_i64(key::STEPS_PER_REV, defaults.steps_per_rev),
            thread_pitch_mm: store.get_f32(key::THREAD_PITCH, defaults.thread_pitch_mm),
            steps_slow: store.get_i64(key::STEPS_SLOW, Self::factory_steps_slow(defaults)),
            steps_fast: store.get_i64(key::STEPS_FAST, Self::factory_steps_fast(defaults)),
            direction: store.get_i64(key::MOTOR_DIR, defaults.direction),
            max_speed: store.get_i64(key::MOTOR_SPEED_MAX, defaults.resolved_max_speed()),
            toolchange_speed: store.get_i64(
                key::SPEED_TOOLCHANGE,
                defaults.resolved_toolchange_speed(),
            ),
            acceleration: store.get_i64(key::MOTOR_ACC, defaults.resolved_acceleration()),
            auto_zero_speed: store.get_i64(key::AUTO_ZERO_SPEED, defaults.auto_zero_speed),
            end_stop_normally_closed: store
                .get_bool(key::END_STOP_NC, defaults.end_stop_normally_closed),
            tool_length_normally_closed: store
                .get_bool(key::TOOL_LENGTH_NC, defaults.tool_length_normally_closed),
            tool_length_enable_normally_closed: store.get_bool(
                key::TOOL_LENGTH_ENABLE_NC,
                defaults.tool_length_enable_normally_closed,
            ),
            tool_length_height_mm: store
                .get_f32(key::TOOL_LENGTH_HEIGHT, defaults.tool_length_height_mm),
            workspace_height_mm: store.get_f32(key::WORKSPACE_HEIGHT, defaults.workspace_height_mm),
            power_on_toolchange: store
                .get_bool(key::POWER_ON_TOOLCHANGE, defaults.power_on_toolchange),
        }
    }

    /// Wipe the store and reload the deployment defaults.
    pub fn reset<S: SettingsStore + ?Sized>(
        store: &mut S,
        defaults: &MachineCfg,
    ) -> Result<Self, BoxedError> {
        store.clear()?;
        Ok(Self::load(store, defaults))
    }

    /// Carriage travel per motor step, in millimetres.
    #[must_use]
    pub fn mm_per_step(&self) -> f32 {
        self.thread_pitch_mm / self.steps_per_revolution as f32
    }

    /// Convert a raw step count to a signed display position in millimetres,
    /// rounded to hundredths.
    #[must_use]
    pub fn position_in_mm(&self, steps: i64) -> f32 {
        round_to_hundredths(steps as f32 * self.mm_per_step()) * self.direction as f32
    }

    /// Convert a millimetre distance to whole steps, truncating toward zero.
    #[must_use]
    pub fn steps_for_mm(&self, mm: f32) -> i64 {
        (mm / self.mm_per_step()) as i64
    }

    /// Slow-mode encoder step count for the deployment's factory geometry.
    /// Serves as both the load default and the editor floor.
    #[must_use]
    pub fn factory_steps_slow(defaults: &MachineCfg) -> i64 {
        derived_steps(ENCODER_SLOW_MM, factory_mm_per_step(defaults))
    }

    /// Fast-mode encoder step count for the deployment's factory geometry.
    #[must_use]
    pub fn factory_steps_fast(defaults: &MachineCfg) -> i64 {
        derived_steps(ENCODER_FAST_MM, factory_mm_per_step(defaults))
    }

    /// Motor steps matching one slow-mode detent for the spindle geometry as
    /// currently configured. The editor scales slow-step edits by this.
    #[must_use]
    pub fn slow_detent_steps(&self) -> i64 {
        derived_steps(ENCODER_SLOW_MM, self.mm_per_step())
    }

    /// Motor steps matching one fast-mode detent for the current geometry.
    #[must_use]
    pub fn fast_detent_steps(&self) -> i64 {
        derived_steps(ENCODER_FAST_MM, self.mm_per_step())
    }

    pub fn set_steps_per_revolution<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: i64,
    ) -> Result<(), BoxedError> {
        self.steps_per_revolution = v;
        store.put_i64(key::STEPS_PER_REV, v)
    }

    pub fn set_thread_pitch_mm<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: f32,
    ) -> Result<(), BoxedError> {
        self.thread_pitch_mm = v;
        store.put_f32(key::THREAD_PITCH, v)
    }

    pub fn set_steps_slow<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: i64,
    ) -> Result<(), BoxedError> {
        self.steps_slow = v;
        store.put_i64(key::STEPS_SLOW, v)
    }

    pub fn set_steps_fast<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: i64,
    ) -> Result<(), BoxedError> {
        self.steps_fast = v;
        store.put_i64(key::STEPS_FAST, v)
    }

    pub fn set_direction<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: i64,
    ) -> Result<(), BoxedError> {
        self.direction = v;
        store.put_i64(key::MOTOR_DIR, v)
    }

    pub fn set_max_speed<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: i64,
    ) -> Result<(), BoxedError> {
        self.max_speed = v;
        store.put_i64(key::MOTOR_SPEED_MAX, v)
    }

    pub fn set_toolchange_speed<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: i64,
    ) -> Result<(), BoxedError> {
        self.toolchange_speed = v;
        store.put_i64(key::SPEED_TOOLCHANGE, v)
    }

    pub fn set_acceleration<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: i64,
    ) -> Result<(), BoxedError> {
        self.acceleration = v;
        store.put_i64(key::MOTOR_ACC, v)
    }

    pub fn set_auto_zero_speed<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: i64,
    ) -> Result<(), BoxedError> {
        self.auto_zero_speed = v;
        store.put_i64(key::AUTO_ZERO_SPEED, v)
    }

    pub fn set_end_stop_normally_closed<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: bool,
    ) -> Result<(), BoxedError> {
        self.end_stop_normally_closed = v;
        store.put_bool(key::END_STOP_NC, v)
    }

    pub fn set_tool_length_normally_closed<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: bool,
    ) -> Result<(), BoxedError> {
        self.tool_length_normally_closed = v;
        store.put_bool(key::TOOL_LENGTH_NC, v)
    }

    pub fn set_tool_length_enable_normally_closed<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: bool,
    ) -> Result<(), BoxedError> {
        self.tool_length_enable_normally_closed = v;
        store.put_bool(key::TOOL_LENGTH_ENABLE_NC, v)
    }

    pub fn set_tool_length_height_mm<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: f32,
    ) -> Result<(), BoxedError> {
        self.tool_length_height_mm = v;
        store.put_f32(key::TOOL_LENGTH_HEIGHT, v)
    }

    pub fn set_workspace_height_mm<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: f32,
    ) -> Result<(), BoxedError> {
        self.workspace_height_mm = v;
        store.put_f32(key::WORKSPACE_HEIGHT, v)
    }

    pub fn set_power_on_toolchange<S: SettingsStore + ?Sized>(
        &mut self,
        store: &mut S,
        v: bool,
    ) -> Result<(), BoxedError> {
        self.power_on_toolchange = v;
        store.put_bool(key::POWER_ON_TOOLCHANGE, v)
    }
}

fn derived_steps(mm: f32, mm_per_step: f32) -> i64 {
    let steps = mm / mm_per_step;
    // Mid-edit geometry can be degenerate (zero pitch); freeze the detent
    // scale instead of saturating to i64::MAX.
    if steps.is_finite() { steps.round() as i64 } else { 0 }
}

fn factory_mm_per_step(defaults: &MachineCfg) -> f32 {
    defaults.thread_pitch_mm / defaults.steps_per_rev as f32
}
