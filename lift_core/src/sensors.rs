//! Polarity-aware views over the raw sensor inputs.
//!
//! The hardware reports whether each input circuit is closed; whether that
//! means "triggered" depends on how the switch is wired. `triggered` is the
//! single place that decision is made.

use eyre::WrapErr;
use lift_traits::SensorPort;

use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::settings::LiftSettings;

/// A normally-open switch triggers when its circuit closes; a normally-closed
/// switch triggers when it opens.
#[must_use]
pub fn triggered(raw_closed: bool, normally_closed: bool) -> bool {
    raw_closed != normally_closed
}

/// The machine's three sensor inputs with polarity applied per the live
/// settings.
pub struct Sensors<P: SensorPort> {
    port: P,
}

impl<P: SensorPort> Sensors<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// True when the carriage is pressing the top end-stop.
    pub fn end_stop_triggered(&mut self, settings: &LiftSettings) -> Result<bool> {
        let closed = self
            .port
            .end_stop_closed()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading end-stop")?;
        Ok(triggered(closed, settings.end_stop_normally_closed))
    }

    /// True when the tool is pressing the tool-length probe.
    pub fn tool_length_triggered(&mut self, settings: &LiftSettings) -> Result<bool> {
        let closed = self
            .port
            .tool_length_closed()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading tool-length sensor")?;
        Ok(triggered(closed, settings.tool_length_normally_closed))
    }

    /// True when the tool-length probe is plugged in and enabled.
    pub fn tool_length_enabled(&mut self, settings: &LiftSettings) -> Result<bool> {
        let closed = self
            .port
            .tool_length_enable_closed()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading tool-length enable")?;
        Ok(triggered(closed, settings.tool_length_enable_normally_closed))
    }
}
