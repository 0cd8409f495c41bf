//! Cheap in-memory doubles for exercising the controller without hardware.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use lift_traits::{ControlPanel, InputSnapshot, SensorPort, SettingsStore, StepDevice};

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// In-memory settings store with typed maps per value kind.
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    ints: BTreeMap<String, i64>,
    floats: BTreeMap<String, f32>,
    bools: BTreeMap<String, bool>,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_i64(mut self, key: &str, v: i64) -> Self {
        self.ints.insert(key.to_owned(), v);
        self
    }

    #[must_use]
    pub fn with_f32(mut self, key: &str, v: f32) -> Self {
        self.floats.insert(key.to_owned(), v);
        self
    }

    #[must_use]
    pub fn with_bool(mut self, key: &str, v: bool) -> Self {
        self.bools.insert(key.to_owned(), v);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.floats.is_empty() && self.bools.is_empty()
    }
}

impl SettingsStore for MemStore {
    fn get_i64(&mut self, key: &str, default: i64) -> i64 {
        self.ints.get(key).copied().unwrap_or(default)
    }
    fn get_f32(&mut self, key: &str, default: f32) -> f32 {
        self.floats.get(key).copied().unwrap_or(default)
    }
    fn get_bool(&mut self, key: &str, default: bool) -> bool {
        self.bools.get(key).copied().unwrap_or(default)
    }
    fn put_i64(&mut self, key: &str, value: i64) -> Result<(), BoxedError> {
        self.ints.insert(key.to_owned(), value);
        Ok(())
    }
    fn put_f32(&mut self, key: &str, value: f32) -> Result<(), BoxedError> {
        self.floats.insert(key.to_owned(), value);
        Ok(())
    }
    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), BoxedError> {
        self.bools.insert(key.to_owned(), value);
        Ok(())
    }
    fn clear(&mut self) -> Result<(), BoxedError> {
        self.ints.clear();
        self.floats.clear();
        self.bools.clear();
        Ok(())
    }
}

/// Raw input levels for `LevelSensors`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SensorLevels {
    pub end_stop_closed: bool,
    pub tool_length_closed: bool,
    pub tool_length_enable_closed: bool,
}

/// Sensor port whose levels a test can flip while the controller owns it.
/// Clones share state.
#[derive(Debug, Default, Clone)]
pub struct LevelSensors {
    levels: Arc<Mutex<SensorLevels>>,
}

impl LevelSensors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_end_stop_closed(&self, v: bool) {
        if let Ok(mut l) = self.levels.lock() {
            l.end_stop_closed = v;
        }
    }

    pub fn set_tool_length_closed(&self, v: bool) {
        if let Ok(mut l) = self.levels.lock() {
            l.tool_length_closed = v;
        }
    }

    pub fn set_tool_length_enable_closed(&self, v: bool) {
        if let Ok(mut l) = self.levels.lock() {
            l.tool_length_enable_closed = v;
        }
    }

    fn read(&self) -> SensorLevels {
        self.levels.lock().map(|l| *l).unwrap_or_default()
    }
}

impl SensorPort for LevelSensors {
    fn end_stop_closed(&mut self) -> Result<bool, BoxedError> {
        Ok(self.read().end_stop_closed)
    }
    fn tool_length_closed(&mut self) -> Result<bool, BoxedError> {
        Ok(self.read().tool_length_closed)
    }
    fn tool_length_enable_closed(&mut self) -> Result<bool, BoxedError> {
        Ok(self.read().tool_length_enable_closed)
    }
}

/// Control panel fed from a shared queue of snapshots; an empty queue polls
/// as no input. Clones share the queue and the jog levels, so a test can keep
/// a handle while the controller owns the panel.
#[derive(Debug, Default, Clone)]
pub struct ScriptPanel {
    queue: Arc<Mutex<VecDeque<InputSnapshot>>>,
    up: Arc<AtomicBool>,
    down: Arc<AtomicBool>,
}

impl ScriptPanel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, snap: InputSnapshot) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(snap);
        }
    }

    pub fn set_up_held(&self, v: bool) {
        self.up.store(v, Ordering::Relaxed);
    }

    pub fn set_down_held(&self, v: bool) {
        self.down.store(v, Ordering::Relaxed);
    }
}

impl ControlPanel for ScriptPanel {
    fn poll(&mut self) -> Result<InputSnapshot, BoxedError> {
        Ok(self
            .queue
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_default())
    }
    fn up_held(&mut self) -> Result<bool, BoxedError> {
        Ok(self.up.load(Ordering::Relaxed))
    }
    fn down_held(&mut self) -> Result<bool, BoxedError> {
        Ok(self.down.load(Ordering::Relaxed))
    }
}

/// Step device that counts pulses. Clones share the counters, so a test can
/// keep a handle while the drive owns the device.
#[derive(Debug, Default, Clone)]
pub struct RecordingDevice {
    forward: Arc<AtomicI64>,
    backward: Arc<AtomicI64>,
}

impl RecordingDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn forward_steps(&self) -> i64 {
        self.forward.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn backward_steps(&self) -> i64 {
        self.backward.load(Ordering::Relaxed)
    }

    /// Net signed travel in steps.
    #[must_use]
    pub fn net_steps(&self) -> i64 {
        self.forward_steps() - self.backward_steps()
    }
}

impl StepDevice for RecordingDevice {
    fn step_forward(&mut self) -> Result<(), BoxedError> {
        self.forward.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    fn step_backward(&mut self) -> Result<(), BoxedError> {
        self.backward.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Device that fails every pulse, for wiring tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct FaultDevice;

impl StepDevice for FaultDevice {
    fn step_forward(&mut self) -> Result<(), BoxedError> {
        Err("no step device attached".into())
    }
    fn step_backward(&mut self) -> Result<(), BoxedError> {
        Err("no step device attached".into())
    }
}
