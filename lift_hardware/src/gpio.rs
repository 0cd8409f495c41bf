//! Raspberry Pi GPIO backend (rppal), behind the `hardware` feature.
//!
//! Buttons and sensors are wired active-low with the internal pull-ups, so a
//! closed contact reads low. The panel classifies press versus hold with
//! [`crate::util::ButtonTracker`] and decodes the hand wheel with
//! [`crate::util::QuadratureDecoder`]; both want to be polled at a steady rate
//! (the input sampler thread takes care of that).

use std::time::{Duration, Instant};

use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::debug;

use lift_config::Pins;
use lift_traits::{ControlPanel, InputSnapshot, SensorPort, StepDevice};

use crate::error::{HwError, Result};
use crate::util::{ButtonEvent, ButtonTracker, QuadratureDecoder};

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Minimum step-pulse width the drive accepts.
const STEP_PULSE: Duration = Duration::from_micros(2);

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

/// Step/dir stepper drive. "Forward" raises the raw step counter; which
/// physical direction that is depends on the deployment's `direction` sign.
pub struct GpioStepper {
    step: OutputPin,
    dir: OutputPin,
}

impl GpioStepper {
    pub fn new(pins: &Pins) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut step = gpio.get(pins.step).map_err(gpio_err)?.into_output();
        let dir = gpio.get(pins.dir).map_err(gpio_err)?.into_output();
        step.set_low();
        debug!(step = pins.step, dir = pins.dir, "stepper pins ready");
        Ok(Self { step, dir })
    }

    fn pulse(&mut self) {
        self.step.set_high();
        let t0 = Instant::now();
        while t0.elapsed() < STEP_PULSE {
            std::hint::spin_loop();
        }
        self.step.set_low();
    }
}

impl StepDevice for GpioStepper {
    fn step_forward(&mut self) -> std::result::Result<(), BoxedError> {
        self.dir.set_high();
        self.pulse();
        Ok(())
    }

    fn step_backward(&mut self) -> std::result::Result<(), BoxedError> {
        self.dir.set_low();
        self.pulse();
        Ok(())
    }
}

/// The three sensor inputs, pulled up, read as raw circuit levels.
pub struct GpioSensors {
    end_stop: InputPin,
    tool_length: InputPin,
    tool_length_enable: InputPin,
}

impl GpioSensors {
    pub fn new(pins: &Pins) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let end_stop = gpio
            .get(pins.sensor_end_stop)
            .map_err(gpio_err)?
            .into_input_pullup();
        let tool_length = gpio
            .get(pins.sensor_tool_length)
            .map_err(gpio_err)?
            .into_input_pullup();
        let tool_length_enable = gpio
            .get(pins.sensor_tool_length_enable)
            .map_err(gpio_err)?
            .into_input_pullup();
        debug!(
            end_stop = pins.sensor_end_stop,
            tool_length = pins.sensor_tool_length,
            enable = pins.sensor_tool_length_enable,
            "sensor pins ready"
        );
        Ok(Self {
            end_stop,
            tool_length,
            tool_length_enable,
        })
    }
}

impl SensorPort for GpioSensors {
    fn end_stop_closed(&mut self) -> std::result::Result<bool, BoxedError> {
        Ok(self.end_stop.is_low())
    }

    fn tool_length_closed(&mut self) -> std::result::Result<bool, BoxedError> {
        Ok(self.tool_length.is_low())
    }

    fn tool_length_enable_closed(&mut self) -> std::result::Result<bool, BoxedError> {
        Ok(self.tool_length_enable.is_low())
    }
}

struct Button {
    pin: InputPin,
    tracker: ButtonTracker,
}

impl Button {
    fn sample(&mut self, now_ms: u64) -> Option<ButtonEvent> {
        let down = self.pin.is_low();
        self.tracker.update(now_ms, down)
    }
}

/// Operator panel: four command buttons, two jog buttons and the hand wheel.
pub struct GpioPanel {
    toolchange: Button,
    set_zero: Button,
    set_speed: Button,
    goto_bottom: Button,
    jog_up: InputPin,
    jog_down: InputPin,
    enc_a: InputPin,
    enc_b: InputPin,
    decoder: QuadratureDecoder,
    epoch: Instant,
}

impl GpioPanel {
    pub fn new(pins: &Pins) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let button = |pin: u8| -> Result<Button> {
            Ok(Button {
                pin: gpio.get(pin).map_err(gpio_err)?.into_input_pullup(),
                tracker: ButtonTracker::new(),
            })
        };
        let input = |pin: u8| -> Result<InputPin> {
            Ok(gpio.get(pin).map_err(gpio_err)?.into_input_pullup())
        };
        debug!(
            toolchange = pins.button_toolchange,
            set_zero = pins.button_set_zero,
            set_speed = pins.button_set_speed,
            goto_bottom = pins.button_goto_bottom,
            up = pins.button_up,
            down = pins.button_down,
            enc_a = pins.encoder_a,
            enc_b = pins.encoder_b,
            "panel pins ready"
        );
        Ok(Self {
            toolchange: button(pins.button_toolchange)?,
            set_zero: button(pins.button_set_zero)?,
            set_speed: button(pins.button_set_speed)?,
            goto_bottom: button(pins.button_goto_bottom)?,
            jog_up: input(pins.button_up)?,
            jog_down: input(pins.button_down)?,
            enc_a: input(pins.encoder_a)?,
            enc_b: input(pins.encoder_b)?,
            decoder: QuadratureDecoder::new(),
            epoch: Instant::now(),
        })
    }
}

impl ControlPanel for GpioPanel {
    fn poll(&mut self) -> std::result::Result<InputSnapshot, BoxedError> {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let mut snap = InputSnapshot::default();

        // The toolchange key only acts on release; a long press means nothing.
        if self.toolchange.sample(now_ms) == Some(ButtonEvent::Press) {
            snap.toolchange_press = true;
        }
        match self.set_zero.sample(now_ms) {
            Some(ButtonEvent::Press) => snap.set_zero_press = true,
            Some(ButtonEvent::Hold) => snap.set_zero_hold = true,
            None => {}
        }
        match self.set_speed.sample(now_ms) {
            Some(ButtonEvent::Press) => snap.set_speed_press = true,
            Some(ButtonEvent::Hold) => snap.set_speed_hold = true,
            None => {}
        }
        match self.goto_bottom.sample(now_ms) {
            Some(ButtonEvent::Press) => snap.goto_bottom_press = true,
            Some(ButtonEvent::Hold) => snap.goto_bottom_hold = true,
            None => {}
        }

        snap.encoder_delta = self.decoder.update(self.enc_a.is_low(), self.enc_b.is_low());
        Ok(snap)
    }

    fn up_held(&mut self) -> std::result::Result<bool, BoxedError> {
        Ok(self.jog_up.is_low())
    }

    fn down_held(&mut self) -> std::result::Result<bool, BoxedError> {
        Ok(self.jog_down.is_low())
    }
}
