#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Deployment profiles for the router-lift controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Two hardware revisions exist in the field with different pin maps and
//!   compiled defaults; both ship as presets (`rev_a`, `rev_b`).
//! - `store::FileStore` is the durable calibration store (flat TOML table).
use serde::Deserialize;

pub mod store;
pub use store::FileStore;

/// GPIO pin assignments (BCM numbering). Unused by the simulated backend but
/// still validated so a profile works on both.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pins {
    pub step: u8,
    pub dir: u8,
    pub button_up: u8,
    pub button_down: u8,
    pub button_toolchange: u8,
    pub button_set_zero: u8,
    pub button_set_speed: u8,
    pub button_goto_bottom: u8,
    pub encoder_a: u8,
    pub encoder_b: u8,
    pub sensor_end_stop: u8,
    pub sensor_tool_length: u8,
    pub sensor_tool_length_enable: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self::rev_a()
    }
}

impl Pins {
    /// First hardware revision.
    pub fn rev_a() -> Self {
        Self {
            step: 19,
            dir: 15,
            button_up: 23,
            button_down: 18,
            button_toolchange: 32,
            button_set_zero: 13,
            button_set_speed: 4,
            button_goto_bottom: 25,
            encoder_a: 14,
            encoder_b: 27,
            sensor_end_stop: 16,
            sensor_tool_length: 17,
            sensor_tool_length_enable: 5,
        }
    }

    /// Second hardware revision (rewired buttons and sensors).
    pub fn rev_b() -> Self {
        Self {
            step: 12,
            dir: 13,
            button_up: 21,
            button_down: 19,
            button_toolchange: 18,
            button_set_zero: 5,
            button_set_speed: 17,
            button_goto_bottom: 16,
            encoder_a: 14,
            encoder_b: 27,
            sensor_end_stop: 33,
            sensor_tool_length: 25,
            sensor_tool_length_enable: 26,
        }
    }
}

/// Compiled-default calibration for one deployment. These values seed the
/// calibration store when a key is absent and they are what a settings reset
/// restores.
///
/// `max_speed`, `toolchange_speed` and `acceleration` default from
/// `steps_per_rev` when left unset (one revolution per second, quarter of that
/// as acceleration), matching how the two revisions were shipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MachineCfg {
    /// Full steps per leadscrew revolution (drive microstepping included).
    pub steps_per_rev: i64,
    /// Leadscrew travel per revolution [mm].
    pub thread_pitch_mm: f32,
    /// Sign mapping motor rotation to carriage "up": -1 or 1.
    pub direction: i64,
    /// [steps/s]; None derives `steps_per_rev`.
    pub max_speed: Option<i64>,
    /// [steps/s]; None derives `steps_per_rev`.
    pub toolchange_speed: Option<i64>,
    /// [steps/s^2]; None derives `steps_per_rev / 4`.
    pub acceleration: Option<i64>,
    /// [steps/s]
    pub auto_zero_speed: i64,
    pub end_stop_normally_closed: bool,
    pub tool_length_normally_closed: bool,
    pub tool_length_enable_normally_closed: bool,
    /// Reference height of the tool-length probe [mm].
    pub tool_length_height_mm: f32,
    /// Height of the jogging envelope armed after a toolchange [mm].
    pub workspace_height_mm: f32,
    /// Drive straight into the toolchange cycle on power-up.
    pub power_on_toolchange: bool,
}

impl Default for MachineCfg {
    fn default() -> Self {
        Self::rev_a()
    }
}

impl MachineCfg {
    /// First revision: 8x microstepped 200-step motor, end-stop wired
    /// normally-open.
    pub fn rev_a() -> Self {
        Self {
            steps_per_rev: 1600,
            thread_pitch_mm: 8.0,
            direction: -1,
            max_speed: None,
            toolchange_speed: None,
            acceleration: None,
            auto_zero_speed: 1600,
            end_stop_normally_closed: false,
            tool_length_normally_closed: false,
            tool_length_enable_normally_closed: false,
            tool_length_height_mm: 0.0,
            workspace_height_mm: 75.0,
            power_on_toolchange: false,
        }
    }

    /// Second revision: full-step drive, end-stop wired normally-closed.
    pub fn rev_b() -> Self {
        Self {
            steps_per_rev: 400,
            end_stop_normally_closed: true,
            ..Self::rev_a()
        }
    }

    pub fn resolved_max_speed(&self) -> i64 {
        self.max_speed.unwrap_or(self.steps_per_rev)
    }

    pub fn resolved_toolchange_speed(&self) -> i64 {
        self.toolchange_speed.unwrap_or(self.steps_per_rev)
    }

    pub fn resolved_acceleration(&self) -> i64 {
        self.acceleration.unwrap_or(self.steps_per_rev >> 2)
    }
}

/// Control-loop pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    /// Tick interval of the state-machine loop [us]. Bounds the constant-speed
    /// step rate, so keep it well under 1e6 / max_speed.
    pub tick_us: u64,
    /// Period of status rendering in the CLI run loop [ms].
    pub render_ms: u64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            tick_us: 250,
            render_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Where the durable calibration store lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettingsCfg {
    pub path: String,
}

impl Default for SettingsCfg {
    fn default() -> Self {
        Self {
            path: "lift_settings.toml".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub machine: MachineCfg,
    pub control: ControlCfg,
    pub logging: Logging,
    pub settings: SettingsCfg,
}

impl Config {
    pub fn rev_a() -> Self {
        Self::default()
    }

    pub fn rev_b() -> Self {
        Self {
            pins: Pins::rev_b(),
            machine: MachineCfg::rev_b(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Machine
        if self.machine.steps_per_rev <= 0 {
            eyre::bail!("machine.steps_per_rev must be > 0");
        }
        if !(self.machine.thread_pitch_mm > 0.0) {
            eyre::bail!("machine.thread_pitch_mm must be > 0");
        }
        if self.machine.direction != -1 && self.machine.direction != 1 {
            eyre::bail!("machine.direction must be -1 or 1");
        }
        if self.machine.resolved_max_speed() <= 0 {
            eyre::bail!("machine.max_speed must be > 0");
        }
        if self.machine.resolved_toolchange_speed() <= 0 {
            eyre::bail!("machine.toolchange_speed must be > 0");
        }
        if self.machine.resolved_acceleration() <= 0 {
            eyre::bail!("machine.acceleration must be > 0");
        }
        if self.machine.auto_zero_speed <= 0 {
            eyre::bail!("machine.auto_zero_speed must be > 0");
        }
        if self.machine.workspace_height_mm < 0.0 {
            eyre::bail!("machine.workspace_height_mm must be >= 0");
        }
        // tool_length_height_mm is intentionally unconstrained; the probe
        // reference may sit below the zero plane.

        // Control
        if self.control.tick_us == 0 {
            eyre::bail!("control.tick_us must be >= 1");
        }
        if self.control.tick_us > 1_000_000 {
            eyre::bail!("control.tick_us is unreasonably large (>1s)");
        }
        if self.control.render_ms == 0 {
            eyre::bail!("control.render_ms must be >= 1");
        }

        if self.settings.path.is_empty() {
            eyre::bail!("settings.path must not be empty");
        }

        Ok(())
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}
