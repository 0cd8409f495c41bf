use lift_config::MachineCfg;
use lift_core::error::BuildError;
use lift_core::mocks::{LevelSensors, RecordingDevice, ScriptPanel};
use lift_core::{Lift, LiftState};
use rstest::rstest;

#[rstest]
fn builder_missing_device_yields_typed_build_error() {
    let err = Lift::builder()
        // missing with_device()
        .with_sensors(LevelSensors::new())
        .with_panel(ScriptPanel::new())
        .try_build()
        .expect_err("should fail with MissingDevice");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingDevice) => {}
        other => panic!("expected MissingDevice, got: {other:?}"),
    }
}

#[rstest]
fn builder_missing_sensors_yields_typed_build_error() {
    let err = Lift::builder()
        .with_device(RecordingDevice::new())
        // missing with_sensors()
        .with_panel(ScriptPanel::new())
        .try_build()
        .expect_err("should fail with MissingSensors");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingSensors) => {}
        other => panic!("expected MissingSensors, got: {other:?}"),
    }
}

#[rstest]
fn builder_missing_panel_yields_typed_build_error() {
    let err = Lift::builder()
        .with_device(RecordingDevice::new())
        .with_sensors(LevelSensors::new())
        // missing with_panel()
        .try_build()
        .expect_err("should fail with MissingPanel");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingPanel) => {}
        other => panic!("expected MissingPanel, got: {other:?}"),
    }
}

#[rstest]
fn builder_reports_missing_device_before_other_gaps() {
    // Nothing is set; the device is checked first.
    let err = Lift::builder().try_build().expect_err("should fail");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingDevice) => {}
        other => panic!("expected MissingDevice, got: {other:?}"),
    }
}

#[rstest]
#[case::zero_direction(MachineCfg { direction: 0, ..MachineCfg::rev_a() }, "direction")]
#[case::no_steps(MachineCfg { steps_per_rev: 0, ..MachineCfg::rev_a() }, "steps_per_rev")]
#[case::flat_pitch(MachineCfg { thread_pitch_mm: 0.0, ..MachineCfg::rev_a() }, "thread_pitch_mm")]
#[case::stalled_probe(MachineCfg { auto_zero_speed: 0, ..MachineCfg::rev_a() }, "auto_zero_speed")]
fn builder_rejects_broken_machine_profiles(#[case] machine: MachineCfg, #[case] field: &str) {
    let err = Lift::builder()
        .with_device(RecordingDevice::new())
        .with_sensors(LevelSensors::new())
        .with_panel(ScriptPanel::new())
        .with_machine(machine)
        .try_build()
        .expect_err("should fail with InvalidConfig");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => {
            assert!(msg.contains(field), "message {msg:?} does not name {field}");
        }
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[rstest]
fn build_with_all_ports_starts_idle_on_rev_a_defaults() {
    let mut lift = Lift::builder()
        .with_device(RecordingDevice::new())
        .with_sensors(LevelSensors::new())
        .with_panel(ScriptPanel::new())
        .build()
        .expect("build lift");

    assert_eq!(lift.state(), LiftState::DefaultStart);
    assert_eq!(lift.position_steps(), 0);
    assert_eq!(lift.settings().max_speed, 1600);
    assert_eq!(lift.settings().direction, -1);
    assert!(!lift.slow_mode());

    // Power-on toolchange is off in the rev A profile, so this is a no-op.
    lift.power_on().expect("power on");
    assert_eq!(lift.state(), LiftState::DefaultStart);

    lift.tick().expect("tick");
    let status = lift.status().expect("status");
    assert_eq!(status.state, LiftState::DefaultStart);
    assert_eq!(status.position_steps, 0);
    assert!(status.message.is_none());
}
