pub mod clock;

pub use clock::{Clock, MonotonicClock, SimClock};

/// One-wire-pair stepper interface: a single step pulse per call, direction
/// chosen by the method. Implementations own the step/dir lines.
pub trait StepDevice {
    fn step_forward(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn step_backward(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Raw sensor levels as wired: `true` means the input circuit is closed
/// (active-low input pulled to ground). Polarity normalization happens above
/// this trait.
pub trait SensorPort {
    fn end_stop_closed(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
    fn tool_length_closed(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
    fn tool_length_enable_closed(&mut self)
    -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Debounced operator input: `poll` returns the edges collected since the
/// previous poll, `up_held`/`down_held` expose the live jog button levels.
pub trait ControlPanel {
    fn poll(&mut self) -> Result<InputSnapshot, Box<dyn std::error::Error + Send + Sync>>;
    fn up_held(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
    fn down_held(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Durable flat key-value calibration storage. Reads fall back to the caller's
/// default when the key is absent or unreadable; writes persist immediately.
pub trait SettingsStore {
    fn get_i64(&mut self, key: &str, default: i64) -> i64;
    fn get_f32(&mut self, key: &str, default: f32) -> f32;
    fn get_bool(&mut self, key: &str, default: bool) -> bool;
    fn put_i64(&mut self, key: &str, value: i64)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn put_f32(&mut self, key: &str, value: f32)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn put_bool(&mut self, key: &str, value: bool)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn clear(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: StepDevice + ?Sized> StepDevice for Box<T> {
    fn step_forward(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).step_forward()
    }
    fn step_backward(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).step_backward()
    }
}

impl<T: SensorPort + ?Sized> SensorPort for Box<T> {
    fn end_stop_closed(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).end_stop_closed()
    }
    fn tool_length_closed(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).tool_length_closed()
    }
    fn tool_length_enable_closed(
        &mut self,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).tool_length_enable_closed()
    }
}

impl<T: ControlPanel + ?Sized> ControlPanel for Box<T> {
    fn poll(&mut self) -> Result<InputSnapshot, Box<dyn std::error::Error + Send + Sync>> {
        (**self).poll()
    }
    fn up_held(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).up_held()
    }
    fn down_held(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).down_held()
    }
}

impl<T: SettingsStore + ?Sized> SettingsStore for Box<T> {
    fn get_i64(&mut self, key: &str, default: i64) -> i64 {
        (**self).get_i64(key, default)
    }
    fn get_f32(&mut self, key: &str, default: f32) -> f32 {
        (**self).get_f32(key, default)
    }
    fn get_bool(&mut self, key: &str, default: bool) -> bool {
        (**self).get_bool(key, default)
    }
    fn put_i64(&mut self, key: &str, value: i64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).put_i64(key, value)
    }
    fn put_f32(&mut self, key: &str, value: f32) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).put_f32(key, value)
    }
    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).put_bool(key, value)
    }
    fn clear(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).clear()
    }
}

/// Input edges collected by a `ControlPanel` between two polls.
///
/// A press fires when the button is released before the hold threshold; a hold
/// fires once the threshold is crossed while still pressed. The encoder delta
/// accumulates signed detents.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputSnapshot {
    pub encoder_delta: i64,
    pub toolchange_press: bool,
    pub goto_bottom_press: bool,
    pub goto_bottom_hold: bool,
    pub set_zero_press: bool,
    pub set_zero_hold: bool,
    pub set_speed_press: bool,
    pub set_speed_hold: bool,
}

impl InputSnapshot {
    /// Fold `other` into `self` without losing edges: presses and holds OR,
    /// encoder deltas add.
    pub fn merge(&mut self, other: &InputSnapshot) {
        self.encoder_delta += other.encoder_delta;
        self.toolchange_press |= other.toolchange_press;
        self.goto_bottom_press |= other.goto_bottom_press;
        self.goto_bottom_hold |= other.goto_bottom_hold;
        self.set_zero_press |= other.set_zero_press;
        self.set_zero_hold |= other.set_zero_hold;
        self.set_speed_press |= other.set_speed_press;
        self.set_speed_hold |= other.set_speed_hold;
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
