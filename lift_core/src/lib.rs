#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core lift control logic (hardware-agnostic).
//!
//! This crate provides the hardware-independent motion controller of the
//! router lift. All hardware interactions go through the `lift_traits` ports:
//! `StepDevice`, `SensorPort`, `ControlPanel` and `SettingsStore`.
//!
//! ## Architecture
//!
//! - **Motor**: step scheduling with a constant-jerk ramp (`motor` module)
//! - **Envelope**: workspace band and target-lock guards (`envelope` module)
//! - **Settings**: persisted calibration over deployment defaults (`settings`)
//! - **Menu**: the fifteen-page settings editor (`menu` module)
//! - **Controller**: the per-tick machine state loop (`controller` module)
//! - **Collector**: background panel sampling thread (`collector` module)
//!
//! ## Units
//!
//! Internals operate in raw signed motor steps (`i64`); millimetres appear
//! only at the display boundary via `LiftSettings::position_in_mm`.

pub mod builder;
pub mod collector;
pub mod controller;
pub mod envelope;
pub mod error;
pub mod hw_error;
pub mod menu;
pub mod mocks;
pub mod motor;
pub mod sensors;
pub mod settings;
pub mod state;
pub mod status;
pub mod util;

pub use builder::{Lift, LiftBuilder, Missing, Set};
pub use collector::InputSampler;
pub use controller::{Controller, RECOVERY_BACK_OFF_STEPS, RECOVERY_TOLERANCE_MM};
pub use envelope::{Envelope, Motion, TargetLock, Workspace};
pub use error::{
    BuildError, LiftError, Report, Result, ERROR_AUTO_ZERO, ERROR_END_STOP, ERROR_INVALID_STATE,
};
pub use menu::{Menu, MenuPage, PAGE_COUNT};
pub use motor::MotorDrive;
pub use sensors::{triggered, Sensors};
pub use settings::{LiftSettings, ENCODER_FAST_MM, ENCODER_SLOW_MM};
pub use state::LiftState;
pub use status::{LiftStatus, MenuScreen, WorkspaceStatus};
